use error_assertions::Halted;
use parking_lot::{Condvar, Mutex};
use std::{
    any::Any,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

thread_local! {
    static CANCELLED: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Whether the test block running on the current thread has been cancelled.
///
/// Test blocks that loop or block for a long time can poll this to stop
/// promptly once the expectation they are running under has finished.
/// Always false outside of a test block.
pub fn is_cancelled() -> bool {
    CANCELLED.with(|token| {
        token
            .borrow()
            .as_ref()
            .is_some_and(|cancelled| cancelled.load(Ordering::Acquire))
    })
}

/// How the test block left the worker thread
#[derive(Debug)]
pub(crate) enum Exit {
    /// The block returned normally
    Completed,
    /// A failure call unwound the thread after its handler returned
    Halted,
    /// The block panicked
    Panicked(String),
}

/// What happened to the worker when it was cancelled
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Teardown {
    /// The worker was never started
    NotStarted,
    /// The worker had finished and was joined
    Joined,
    /// The worker was still running at the end of the grace period and was
    /// left to finish on its own
    Detached,
}

type Testcase = Box<dyn FnOnce() + Send + 'static>;

/// A disposable thread that runs a single test block, so that a failure call
/// that never returns only ever stops that thread.
pub(crate) struct IsolatedThread {
    name: String,
    testcase: Option<Testcase>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl IsolatedThread {
    pub(crate) fn new<F>(name: impl Into<String>, testcase: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            testcase: Some(Box::new(testcase)),
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new((Mutex::new(false), Condvar::new())),
            handle: None,
        }
    }

    /// Starts running the test block, `on_exit` is invoked on the worker with
    /// the way the block exited
    pub(crate) fn start<X>(&mut self, on_exit: X) -> std::io::Result<()>
    where
        X: FnOnce(Exit) + Send + 'static,
    {
        let Some(testcase) = self.testcase.take() else {
            return Ok(());
        };

        let cancelled = self.cancelled.clone();
        let finished = self.finished.clone();

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                // Once cancelled, nothing observes this thread's failures any
                // more and the handlers may be restored at any moment
                error_assertions::quarantine_on(cancelled.clone());
                CANCELLED.with(|token| *token.borrow_mut() = Some(cancelled));

                let exit = match panic::catch_unwind(AssertUnwindSafe(testcase)) {
                    Ok(()) => Exit::Completed,
                    Err(payload) if payload.is::<Halted>() => Exit::Halted,
                    Err(payload) => Exit::Panicked(panic_message(payload.as_ref())),
                };

                log::trace!("test block exited: {exit:?}");
                on_exit(exit);

                let (lock, cvar) = &*finished;
                *lock.lock() = true;
                cvar.notify_all();
            })?;

        log::debug!("started worker thread '{}'", self.name);
        self.handle = Some(handle);
        Ok(())
    }

    /// Cancels the worker, waiting at most `grace` for it to finish.
    ///
    /// Threads can't be killed, so a worker that is still running user code
    /// at the end of the grace period is detached rather than joined. From
    /// the moment it is cancelled the worker is quarantined, any failure call
    /// it makes halts it rather than reaching a handler.
    pub(crate) fn cancel(&mut self, grace: Duration) -> Teardown {
        self.cancelled.store(true, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return Teardown::NotStarted;
        };

        let deadline = Instant::now() + grace;
        let done = {
            let (lock, cvar) = &*self.finished;
            let mut finished = lock.lock();
            while !*finished {
                if cvar.wait_until(&mut finished, deadline).timed_out() {
                    break;
                }
            }
            *finished
        };

        if done {
            if handle.join().is_err() {
                log::error!("worker thread '{}' panicked outside the test block", self.name);
            }
            Teardown::Joined
        } else {
            log::warn!(
                "worker thread '{}' did not finish within {grace:?} of being cancelled, detaching it",
                self.name
            );
            Teardown::Detached
        }
    }
}

impl Drop for IsolatedThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel(Duration::ZERO);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    fn exit_channel() -> (impl FnOnce(Exit) + Send + 'static, mpsc::Receiver<Exit>) {
        let (tx, rx) = mpsc::channel();
        (
            move |exit| {
                let _ = tx.send(exit);
            },
            rx,
        )
    }

    #[test]
    fn completes_and_joins() {
        let (on_exit, rx) = exit_channel();
        let mut worker = IsolatedThread::new("completes", || {});
        worker.start(on_exit).unwrap();

        let exit = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(exit, Exit::Completed));
        assert_eq!(worker.cancel(Duration::from_secs(5)), Teardown::Joined);
    }

    #[test]
    fn halt_is_not_a_panic() {
        let (on_exit, rx) = exit_channel();
        let mut worker = IsolatedThread::new("halts", || {
            error_assertions::halt(error_assertions::Category::Fatal);
        });
        worker.start(on_exit).unwrap();

        let exit = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(exit, Exit::Halted));
        assert_eq!(worker.cancel(Duration::from_secs(5)), Teardown::Joined);
    }

    #[test]
    fn panics_are_reported() {
        let (on_exit, rx) = exit_channel();
        let mut worker = IsolatedThread::new("panics", || panic!("oh no {}", 1));
        worker.start(on_exit).unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Exit::Panicked(msg) => assert_eq!(msg, "oh no 1"),
            other => panic!("unexpected exit {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_observable() {
        let (on_exit, rx) = exit_channel();
        let mut worker = IsolatedThread::new("polls", || {
            while !is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        });
        worker.start(on_exit).unwrap();

        assert!(!is_cancelled());
        assert_eq!(worker.cancel(Duration::from_secs(5)), Teardown::Joined);
        assert!(matches!(rx.recv().unwrap(), Exit::Completed));
    }

    #[test]
    fn blocked_worker_is_detached() {
        let mut worker = IsolatedThread::new("blocked", || {
            thread::sleep(Duration::from_millis(500));
        });
        worker.start(|_| {}).unwrap();

        assert_eq!(worker.cancel(Duration::from_millis(10)), Teardown::Detached);
        // Cancelling again has nothing left to do
        assert_eq!(worker.cancel(Duration::ZERO), Teardown::NotStarted);
    }

    #[test]
    fn detached_worker_is_quarantined() {
        let (on_exit, rx) = exit_channel();
        let mut worker = IsolatedThread::new("late failure", || {
            thread::sleep(Duration::from_millis(100));
            // No handler is installed, this would abort if it reached the
            // registry
            error_assertions::fatal_error_message("late");
        });
        worker.start(on_exit).unwrap();

        assert_eq!(worker.cancel(Duration::from_millis(10)), Teardown::Detached);
        let exit = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(exit, Exit::Halted));
    }
}
