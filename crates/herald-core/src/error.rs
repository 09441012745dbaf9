use thiserror::Error;

use crate::event::SessionStatus;

/// Top-level error type for Herald.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// `connect()` was called on a session that is already Ready.
    #[error("session is already connected")]
    AlreadyConnected,

    /// A send was attempted while the session is not Ready.
    #[error("session is not ready (status: {0})")]
    NotReady(SessionStatus),

    /// A job was started while another one holds the active slot.
    #[error("job '{0}' is already processing")]
    AlreadyProcessing(String),

    /// The job was rejected at the boundary (empty contacts, bad template, bad pacing).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// Delivery of one message failed. Non-fatal to a running job.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// The transport rejected pairing or the stored credential.
    #[error("auth failure: {0}")]
    AuthFailure(String),

    /// Fetching remote media failed. Aborts only the send that needed it.
    #[error("download error: {0}")]
    Download(String),

    /// The phone string has no digits to build an address from.
    #[error("invalid phone number: '{0}'")]
    InvalidPhone(String),

    /// Error from the messaging transport.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
