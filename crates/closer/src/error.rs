use thiserror::Error;

/// Errors reported by [`Closer::close_all`](crate::Closer::close_all).
///
/// Messages are captured as strings so the first result can be handed to every
/// caller of `close_all`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseError {
    /// A teardown returned an error.
    #[error("teardown {name} failed: {message}")]
    Failed { name: String, message: String },

    /// A teardown panicked.
    #[error("teardown {name} panicked: {message}")]
    Panicked { name: String, message: String },

    /// The deadline passed while teardowns were still running.
    #[error("shutdown deadline exceeded with {pending} teardown(s) still running")]
    DeadlineExceeded { pending: usize },
}

/// Result type for shutdown.
pub type Result<T> = std::result::Result<T, CloseError>;
