//! Event vocabulary pushed from the core to external observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::ProgressSnapshot;

/// Lifecycle state of the messaging session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No transport has been started yet (or it was reset for a retry).
    #[default]
    Uninitialized,
    /// Waiting for the user to scan a pairing challenge.
    AwaitingAuth,
    /// Credentials accepted, waiting for the transport to come up.
    Authenticating,
    /// Sends are allowed.
    Ready,
    Disconnected,
    /// Pairing or credential failure. `connect()` starts over from Uninitialized.
    Errored,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Errored => "errored",
        }
    }

    /// Whether a connection attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::AwaitingAuth | Self::Authenticating)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound message observed on the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    /// Sender phone (digits only, as reported by the transport).
    pub from: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A single contact's delivery failure inside a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorDetail {
    pub job_id: String,
    /// The contact's phone as given in the job, not the normalized address.
    pub phone: String,
    pub error: String,
}

/// Everything the core reports to the UI boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// Raw pairing challenge payload (QR code contents).
    QrCode(String),
    StatusChange(SessionStatus),
    MessageReceived(InboundMessage),
    JobProgress(ProgressSnapshot),
    JobErrorDetail(JobErrorDetail),
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QrCode(_) => "qr-code",
            Self::StatusChange(_) => "status-change",
            Self::MessageReceived(_) => "message-received",
            Self::JobProgress(_) => "job-progress",
            Self::JobErrorDetail(_) => "job-error-detail",
        }
    }
}
