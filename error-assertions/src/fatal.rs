use crate::{AnonymousError, BoxError, Category, SourceLocation};
use std::panic::Location;

/// Reports an unrecoverable error, never returns.
///
/// By default this writes the error to stderr and aborts the process. If the
/// handler has been replaced, see `replace_fatal`, and it returns, the
/// calling thread is unwound with a [`crate::Halted`] payload instead.
#[track_caller]
pub fn fatal_error<E>(error: E) -> !
where
    E: std::error::Error + Send + Sync + 'static,
{
    route(Box::new(error), Location::caller())
}

/// Reports an unrecoverable error with a message, or with no message if it is
/// empty, see [`fatal_error`].
#[track_caller]
pub fn fatal_error_message(message: impl Into<String>) -> ! {
    fatal_error(AnonymousError::new(message))
}

cfg_if::cfg_if! {
    if #[cfg(any(debug_assertions, feature = "replace-fatal"))] {
        #[inline]
        fn route(error: BoxError, location: SourceLocation) -> ! {
            crate::registry::dispatch_unconditional(Category::Fatal, error, location)
        }
    } else {
        #[inline]
        fn route(error: BoxError, location: SourceLocation) -> ! {
            crate::abort_with(Category::Fatal, &*error, location)
        }
    }
}
