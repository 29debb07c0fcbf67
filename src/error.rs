//! Error types for feedwatch.

use thiserror::Error;

/// Common error type for feedwatch.
#[derive(Error, Debug)]
pub enum FeedwatchError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The renderer did not show the expected markup before the deadline.
    #[error("render timeout: {0}")]
    RenderTimeout(String),

    /// A rendered element went away between lookup and read.
    #[error("stale element reference: {0}")]
    StaleReference(String),

    /// Any other renderer failure.
    #[error("render error: {0}")]
    Render(String),

    /// A rendering session could not be opened at all.
    #[error("failed to start rendering session: {0}")]
    SessionAcquisition(String),

    /// Notification delivery failed.
    #[error("notification error: {0}")]
    Notify(String),

    /// A monitor is already active for this recipient.
    #[error("You are already monitoring a feed. Use !stop first.")]
    AlreadyRunning,

    /// No monitor is active for this recipient.
    #[error("You are not currently monitoring anything.")]
    NotRunning,

    /// The service is shutting down and takes no new monitors.
    #[error("The service is shutting down.")]
    ShuttingDown,
}

impl FeedwatchError {
    /// Whether this is a renderer failure that a poll tick recovers from locally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedwatchError::RenderTimeout(_)
                | FeedwatchError::StaleReference(_)
                | FeedwatchError::Render(_)
        )
    }
}

/// Result type alias for feedwatch operations.
pub type Result<T> = std::result::Result<T, FeedwatchError>;
