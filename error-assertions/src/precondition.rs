use crate::{AnonymousError, Category, registry};
use std::panic::Location;

/// Checks a condition that must hold for execution to continue.
///
/// If the condition is `false` the error is written to stderr and the process
/// is aborted, unless the handler has been replaced with
/// [`crate::replace_precondition`], in which case the replacement decides.
#[track_caller]
pub fn precondition<E>(condition: bool, error: E)
where
    E: std::error::Error + Send + Sync + 'static,
{
    registry::dispatch_conditional(
        Category::Precondition,
        condition,
        Box::new(error),
        Location::caller(),
    );
}

/// [`precondition`] with a message instead of an error
#[track_caller]
pub fn precondition_message(condition: bool, message: impl Into<String>) {
    precondition(condition, AnonymousError::new(message));
}

/// Reports that a precondition was violated, never returns.
///
/// If the handler has been replaced with
/// [`crate::replace_precondition_failure`] and it returns, the calling thread
/// is unwound with a [`crate::Halted`] payload.
#[track_caller]
pub fn precondition_failure<E>(error: E) -> !
where
    E: std::error::Error + Send + Sync + 'static,
{
    registry::dispatch_unconditional(
        Category::PreconditionFailure,
        Box::new(error),
        Location::caller(),
    )
}

/// [`precondition_failure`] with a message instead of an error
#[track_caller]
pub fn precondition_failure_message(message: impl Into<String>) -> ! {
    precondition_failure(AnonymousError::new(message))
}
