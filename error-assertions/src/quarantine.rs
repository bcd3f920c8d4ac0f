use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

thread_local! {
    static QUARANTINE: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Ties the current thread to `flag`, once the flag is set every failure call
/// made on this thread halts it instead of reaching a handler.
///
/// This is meant for threads whose failures are no longer being observed, eg.
/// a test block that outlives the expectation it was run under. By the time
/// such a thread makes a failure call its handlers may have been restored to
/// the defaults, which would abort the entire process.
///
/// Only the current thread is affected, threads it spawns are not.
pub fn quarantine_on(flag: Arc<AtomicBool>) {
    QUARANTINE.with(|slot| *slot.borrow_mut() = Some(flag));
}

/// Whether failure calls made on the current thread bypass the registry
pub fn is_quarantined() -> bool {
    QUARANTINE
        .try_with(|slot| {
            slot.borrow()
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Acquire))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Category, Halted};

    #[test]
    fn quarantined_thread_halts_instead_of_aborting() {
        let flag = Arc::new(AtomicBool::new(false));

        let thread_flag = flag.clone();
        let worker = std::thread::spawn(move || {
            quarantine_on(thread_flag.clone());
            assert!(!is_quarantined());
            thread_flag.store(true, Ordering::Release);
            assert!(is_quarantined());

            // Satisfied conditions still just return
            crate::precondition_message(true, "fine");

            // No handler is installed, so this would otherwise abort
            std::panic::catch_unwind(|| {
                crate::fatal_error_message("late");
            })
        });

        let payload = worker
            .join()
            .expect("worker should not panic")
            .expect_err("fatal_error must not return");
        assert_eq!(
            payload.downcast_ref::<Halted>().map(Halted::category),
            Some(Category::Fatal)
        );

        // Other threads are unaffected
        assert!(flag.load(Ordering::Acquire));
        assert!(!is_quarantined());
    }
}
