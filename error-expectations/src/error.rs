use error_assertions::{BoxError, Category, SourceLocation};
use std::time::Duration;

/// The ways an expectation can fail
#[derive(thiserror::Error, Debug)]
pub enum ExpectError {
    #[error("expected failure {expected} but the {category} call at {location} reported {actual:?}")]
    Mismatch {
        /// The `Debug` representation of the expected error
        expected: String,
        actual: BoxError,
        category: Category,
        location: SourceLocation,
    },
    #[error("no failure was reported within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("the test block ran to completion without reporting a failure within {timeout:?}")]
    FinishedWithoutFailure { timeout: Duration },
    #[error("the test block did not finish within {timeout:?}")]
    Unfinished { timeout: Duration },
    #[error("received a {category} failure at {location} when expecting none: {error}")]
    UnexpectedFailure {
        error: BoxError,
        category: Category,
        location: SourceLocation,
    },
    #[error("the test block panicked: {0}")]
    Panicked(String),
    #[error("unable to spawn the worker thread")]
    Spawn(#[from] std::io::Error),
}
