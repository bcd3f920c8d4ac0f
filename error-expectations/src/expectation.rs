use error_assertions::{BoxError, Category, SourceLocation};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A failure reported through one of the intercepted calls
#[derive(Debug)]
pub struct CapturedFailure {
    /// The kind of call that reported the failure
    pub category: Category,
    /// The error passed to the call, or an [`error_assertions::AnonymousError`]
    /// if it was given a message
    pub error: BoxError,
    /// Where the call was made
    pub location: SourceLocation,
}

impl CapturedFailure {
    /// Gets the error as a concrete type
    #[inline]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether the error is of the same type as, and equal to, `expected`
    #[inline]
    pub fn matches<E>(&self, expected: &E) -> bool
    where
        E: std::error::Error + PartialEq + 'static,
    {
        self.downcast_ref::<E>() == Some(expected)
    }
}

/// Everything signaled to an [`Expectation`] by the time the wait ended
#[derive(Default, Debug)]
pub(crate) struct Observed {
    /// The first failure that was captured
    pub(crate) failure: Option<CapturedFailure>,
    /// The test block ran to completion
    pub(crate) completed: bool,
    /// The test block panicked with the message
    pub(crate) panic: Option<String>,
}

/// Bridges signals raised on other threads to a single timeout bounded wait
/// on the test thread.
///
/// Each kind of signal is only ever recorded once.
pub(crate) struct Expectation {
    description: &'static str,
    observed: Mutex<Observed>,
    cvar: Condvar,
}

impl Expectation {
    pub(crate) fn new(description: &'static str) -> Self {
        Self {
            description,
            observed: Mutex::new(Observed::default()),
            cvar: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn description(&self) -> &'static str {
        self.description
    }

    /// Records a captured failure, returning false if one had already been
    /// recorded, in which case this one is discarded
    pub(crate) fn fulfill_failure(&self, failure: CapturedFailure) -> bool {
        let mut observed = self.observed.lock();
        if let Some(first) = &observed.failure {
            log::debug!(
                "{}: ignoring {} failure at {}, already captured {} failure at {}",
                self.description,
                failure.category,
                failure.location,
                first.category,
                first.location
            );
            return false;
        }

        observed.failure = Some(failure);
        self.cvar.notify_all();
        true
    }

    pub(crate) fn fulfill_completion(&self) {
        let mut observed = self.observed.lock();
        observed.completed = true;
        self.cvar.notify_all();
    }

    pub(crate) fn fulfill_panic(&self, message: String) {
        let mut observed = self.observed.lock();
        if observed.panic.is_none() {
            observed.panic = Some(message);
            self.cvar.notify_all();
        }
    }

    /// Blocks until `until` is satisfied or the timeout elapses, and takes
    /// everything that was observed up to that point
    pub(crate) fn wait(&self, timeout: Duration, until: impl Fn(&Observed) -> bool) -> Observed {
        let deadline = Instant::now() + timeout;
        let mut observed = self.observed.lock();

        while !until(&observed) {
            if self.cvar.wait_until(&mut observed, deadline).timed_out() {
                log::debug!("{}: timed out after {timeout:?}", self.description);
                break;
            }
        }

        std::mem::take(&mut *observed)
    }
}
