use std::fmt;

/// An error used whenever a failure call is given a message, or nothing at
/// all, rather than a structured error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AnonymousError {
    /// No message was supplied, or the message was empty
    #[default]
    Blank,
    /// The message passed to the failure call
    WithMessage(String),
}

impl AnonymousError {
    /// Wraps a message, an empty message is [`Self::Blank`]
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();

        if message.is_empty() {
            Self::Blank
        } else {
            Self::WithMessage(message)
        }
    }

    /// The message, if one was supplied
    #[inline]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Blank => None,
            Self::WithMessage(msg) => Some(msg),
        }
    }
}

impl std::error::Error for AnonymousError {}

impl fmt::Display for AnonymousError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => f.write_str("anonymous error"),
            Self::WithMessage(msg) => f.write_str(msg),
        }
    }
}

impl From<&str> for AnonymousError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AnonymousError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
