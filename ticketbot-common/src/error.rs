// ================================================================
// File: ticketbot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    // State machine rejections:
    #[error("Ticket {0} is already closed")]
    AlreadyClosed(String),

    #[error("Ticket {ticket_id} is already claimed by {claimed_by}")]
    AlreadyClaimed { ticket_id: String, claimed_by: String },

    #[error("Ticket {0} is not claimed")]
    NotClaimed(String),

    #[error("Ticket {0} is not closed")]
    NotClosed(String),

    #[error("Open ticket limit reached: {open} open, max {max}")]
    LimitExceeded { open: usize, max: u32 },

    #[error("Guild not configured: {0}")]
    NotConfigured(String),

    #[error("Channel provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Infrastructure:
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl Error {
    /// True for rejections raised by the lifecycle state machine itself
    /// (as opposed to storage or platform failures).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::AlreadyClosed(_)
                | Error::AlreadyClaimed { .. }
                | Error::NotClaimed(_)
                | Error::NotClosed(_)
                | Error::LimitExceeded { .. }
                | Error::NotConfigured(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
