//! Like the precondition calls, but they are only checked when debug
//! assertions are enabled, mirroring [`debug_assert!`].

use crate::{AnonymousError, Category, registry};
use std::panic::Location;

/// Checks a condition in debug builds, a no-op otherwise.
///
/// If the condition is `false` the error is written to stderr and the process
/// is aborted, unless the handler has been replaced with
/// [`crate::replace_assert`].
#[track_caller]
pub fn assertion<E>(condition: bool, error: E)
where
    E: std::error::Error + Send + Sync + 'static,
{
    if cfg!(debug_assertions) {
        registry::dispatch_conditional(
            Category::Assert,
            condition,
            Box::new(error),
            Location::caller(),
        );
    }
}

/// [`assertion`] with a message instead of an error
#[track_caller]
pub fn assertion_message(condition: bool, message: impl Into<String>) {
    if cfg!(debug_assertions) {
        assertion(condition, AnonymousError::new(message));
    }
}

/// Reports an assertion failure in debug builds, a no-op otherwise.
///
/// In debug builds this never returns, if the handler has been replaced with
/// [`crate::replace_assertion_failure`] and it returns, the calling thread is
/// unwound with a [`crate::Halted`] payload.
#[track_caller]
pub fn assertion_failure<E>(error: E)
where
    E: std::error::Error + Send + Sync + 'static,
{
    if cfg!(debug_assertions) {
        registry::dispatch_unconditional(
            Category::AssertionFailure,
            Box::new(error),
            Location::caller(),
        );
    }
}

/// [`assertion_failure`] with a message instead of an error
#[track_caller]
pub fn assertion_failure_message(message: impl Into<String>) {
    if cfg!(debug_assertions) {
        assertion_failure(AnonymousError::new(message));
    }
}
