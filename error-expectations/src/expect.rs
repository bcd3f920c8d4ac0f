use crate::{
    CapturedFailure, ExpectError,
    expectation::{Expectation, Observed},
    thread::{Exit, IsolatedThread},
};
use error_assertions::{
    self as ea, AnonymousError, BoxError, Category, RestorationHandler, SourceLocation,
};
use std::{sync::Arc, time::Duration};

/// How long to wait for the test block by default
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// How long to wait for the worker thread to finish once the expectation is
/// over, before detaching it
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_millis(250);
/// Environment variable that overrides [`DEFAULT_TIMEOUT`], in milliseconds
pub const TIMEOUT_ENV: &str = "ERROR_EXPECTATIONS_TIMEOUT_MS";

const WORKER_NAME: &str = "error-expectations-worker";

/// Runs test blocks on an isolated thread with every failure call
/// intercepted, and checks what they reported.
///
/// ```
/// use error_expectations::Expect;
/// use std::time::Duration;
///
/// let expect = Expect::default().timeout(Duration::from_millis(500));
/// expect
///     .failure_message("negative balance", || {
///         let balance = -1;
///         error_assertions::precondition_message(balance >= 0, "negative balance");
///     })
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct Expect {
    timeout: Duration,
    teardown_timeout: Duration,
}

impl Default for Expect {
    fn default() -> Self {
        Self {
            timeout: timeout_from_env().unwrap_or(DEFAULT_TIMEOUT),
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }
}

fn timeout_from_env() -> Option<Duration> {
    let raw = std::env::var(TIMEOUT_ENV).ok()?;
    parse_timeout(&raw)
}

fn parse_timeout(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            log::warn!("ignoring invalid {TIMEOUT_ENV} value '{raw}': {err}");
            None
        }
    }
}

impl Expect {
    /// Sets how long to wait for the test block to report a failure, or to
    /// finish for [`Self::no_failure`]
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long to wait for the worker thread to finish after the
    /// expectation is resolved
    #[inline]
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Expects the test block to report a failure with an error equal to
    /// `expected`
    pub fn failure<E, F>(&self, expected: E, testcase: F) -> Result<(), ExpectError>
    where
        E: std::error::Error + PartialEq + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        let captured = self.any_failure(testcase)?;

        if captured.matches(&expected) {
            Ok(())
        } else {
            Err(ExpectError::Mismatch {
                expected: format!("{expected:?}"),
                actual: captured.error,
                category: captured.category,
                location: captured.location,
            })
        }
    }

    /// Expects the test block to report a failure with the message, see
    /// [`AnonymousError::new`]
    #[inline]
    pub fn failure_message<F>(
        &self,
        message: impl Into<String>,
        testcase: F,
    ) -> Result<(), ExpectError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.failure(AnonymousError::new(message), testcase)
    }

    /// Expects the test block to report any failure, which is returned
    pub fn any_failure<F>(&self, testcase: F) -> Result<CapturedFailure, ExpectError>
    where
        F: FnOnce() + Send + 'static,
    {
        let observed = self.observe("expecting a failure to occur", testcase, |o| {
            o.failure.is_some() || o.panic.is_some()
        })?;

        match observed {
            Observed {
                failure: Some(failure),
                ..
            } => Ok(failure),
            Observed {
                panic: Some(msg), ..
            } => Err(ExpectError::Panicked(msg)),
            Observed {
                completed: true, ..
            } => Err(ExpectError::FinishedWithoutFailure {
                timeout: self.timeout,
            }),
            Observed { .. } => Err(ExpectError::Timeout {
                timeout: self.timeout,
            }),
        }
    }

    /// Expects the test block to run to completion without reporting any
    /// failure.
    ///
    /// If a failure is reported, that takes precedence even if the block also
    /// completed, eg. because the failure was reported on a thread it spawned.
    pub fn no_failure<F>(&self, testcase: F) -> Result<(), ExpectError>
    where
        F: FnOnce() + Send + 'static,
    {
        let observed = self.observe("expecting no failure to occur", testcase, |o| {
            o.failure.is_some() || o.completed || o.panic.is_some()
        })?;

        match observed {
            Observed {
                failure: Some(failure),
                ..
            } => Err(ExpectError::UnexpectedFailure {
                error: failure.error,
                category: failure.category,
                location: failure.location,
            }),
            Observed {
                panic: Some(msg), ..
            } => Err(ExpectError::Panicked(msg)),
            Observed {
                completed: true, ..
            } => Ok(()),
            Observed { .. } => Err(ExpectError::Unfinished {
                timeout: self.timeout,
            }),
        }
    }

    /// Intercepts every failure call, runs the test block on a new worker
    /// thread and waits for `until`, then tears everything back down
    fn observe<F>(
        &self,
        description: &'static str,
        testcase: F,
        until: fn(&Observed) -> bool,
    ) -> Result<Observed, ExpectError>
    where
        F: FnOnce() + Send + 'static,
    {
        let expectation = Arc::new(Expectation::new(description));

        // Handlers must be in place before the worker can reach a failure call
        let mut session = Session {
            restorations: intercept(&expectation),
            worker: IsolatedThread::new(WORKER_NAME, testcase),
            teardown_timeout: self.teardown_timeout,
        };

        let on_exit = {
            let expectation = expectation.clone();
            move |exit: Exit| match exit {
                Exit::Completed => expectation.fulfill_completion(),
                Exit::Halted => {}
                Exit::Panicked(msg) => expectation.fulfill_panic(msg),
            }
        };
        session.worker.start(on_exit)?;

        log::debug!(
            "{}: waiting up to {:?}",
            expectation.description(),
            self.timeout
        );
        let observed = expectation.wait(self.timeout, until);
        drop(session);

        Ok(observed)
    }
}

/// Cancels the worker and then restores every replaced handler, on every
/// exit path
struct Session {
    restorations: Vec<RestorationHandler>,
    worker: IsolatedThread,
    teardown_timeout: Duration,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.worker.cancel(self.teardown_timeout);

        for restoration in &self.restorations {
            restoration.restore();
        }
    }
}

/// Replaces the handler of every category with one that records the failure
/// in the expectation and stops the calling thread
fn intercept(expectation: &Arc<Expectation>) -> Vec<RestorationHandler> {
    let unconditional = |category: Category| {
        let expectation = expectation.clone();
        move |error: BoxError, location: SourceLocation| {
            expectation.fulfill_failure(CapturedFailure {
                category,
                error,
                location,
            });
        }
    };

    let conditional = |category: Category| {
        let expectation = expectation.clone();
        move |condition: bool, error: BoxError, location: SourceLocation| {
            if !condition {
                expectation.fulfill_failure(CapturedFailure {
                    category,
                    error,
                    location,
                });

                // A destructor run while the thread is being halted can't
                // unwind it a second time
                if !std::thread::panicking() {
                    ea::halt(category);
                }
            }
        }
    };

    vec![
        ea::replace_fatal(unconditional(Category::Fatal)),
        ea::replace_precondition(conditional(Category::Precondition)),
        ea::replace_precondition_failure(unconditional(Category::PreconditionFailure)),
        ea::replace_assert(conditional(Category::Assert)),
        ea::replace_assertion_failure(unconditional(Category::AssertionFailure)),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    /// Held by every test that reads or writes the environment
    static ENV: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn builder() {
        let _env = ENV.lock();
        let expect = Expect::default()
            .timeout(Duration::from_millis(10))
            .teardown_timeout(Duration::from_millis(20));

        assert_eq!(expect.timeout, Duration::from_millis(10));
        assert_eq!(expect.teardown_timeout, Duration::from_millis(20));
    }

    #[test]
    fn parses_timeout_overrides() {
        assert_eq!(parse_timeout("150"), Some(Duration::from_millis(150)));
        assert_eq!(parse_timeout(" 75\n"), Some(Duration::from_millis(75)));
        assert_eq!(parse_timeout("0"), Some(Duration::ZERO));

        assert_eq!(parse_timeout(""), None);
        assert_eq!(parse_timeout("soon"), None);
        assert_eq!(parse_timeout("-5"), None);
        assert_eq!(parse_timeout("1.5"), None);
    }

    #[test]
    #[allow(unsafe_code)]
    fn default_timeout_from_env() {
        let _env = ENV.lock();

        // SAFETY: every test in this binary that touches the environment
        // holds the lock
        unsafe { std::env::set_var(TIMEOUT_ENV, " 300 ") };
        assert_eq!(Expect::default().timeout, Duration::from_millis(300));

        unsafe { std::env::set_var(TIMEOUT_ENV, "3s") };
        assert_eq!(Expect::default().timeout, DEFAULT_TIMEOUT);

        unsafe { std::env::remove_var(TIMEOUT_ENV) };
        let expect = Expect::default();
        assert_eq!(expect.timeout, DEFAULT_TIMEOUT);
        assert_eq!(expect.teardown_timeout, DEFAULT_TEARDOWN_TIMEOUT);
    }
}
