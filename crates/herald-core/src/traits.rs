use crate::{error::HeraldError, event::InboundMessage};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Signals a transport reports about its own connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing challenge (QR payload) is waiting to be scanned.
    Challenge(String),
    /// The challenge was scanned and accepted.
    Paired,
    /// The transport can send.
    Ready,
    Disconnected(String),
    /// Pairing was rejected or the stored credential was revoked.
    AuthFailure(String),
    Message(InboundMessage),
}

/// Messaging Transport trait: the wire.
///
/// The external messaging backend (WhatsApp Web, a test double, ...)
/// implements this trait. Credential persistence is the transport's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Whether a previously paired credential is stored, so `connect` can
    /// skip the pairing challenge.
    async fn has_credentials(&self) -> bool;

    /// Start the transport. Connection signals are pushed into `events`
    /// until `disconnect` is called.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), HeraldError>;

    /// Tear the transport down and release its resources.
    async fn disconnect(&self) -> Result<(), HeraldError>;

    /// Send a text message to a canonical address.
    async fn send_text(&self, address: &str, content: &str) -> Result<(), HeraldError>;

    /// Send a local file with `caption` to a canonical address.
    async fn send_media(&self, address: &str, caption: &str, path: &Path)
        -> Result<(), HeraldError>;
}
