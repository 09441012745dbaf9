//! WhatsApp transport: pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web.
//! Session is persisted to `{data_dir}/whatsapp_session/whatsapp.db`.

mod bot;
mod events;
mod qr;
mod send;
mod transport;


pub use qr::generate_qr_terminal;
pub use send::MediaKind;

use herald_core::config::WhatsAppConfig;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// WhatsApp transport using the WhatsApp Web protocol.
pub struct WhatsAppTransport {
    pub(super) config: WhatsAppConfig,
    pub(super) data_dir: String,
    /// Client handle for sending messages: set once the bot is built.
    pub(super) client: Arc<Mutex<Option<Arc<whatsapp_rust::client::Client>>>>,
    /// Message IDs we sent: used to ignore our own echo.
    pub(super) sent_ids: Arc<Mutex<HashSet<String>>>,
    /// Set when the phone unlinked this device; the next connect starts
    /// from a fresh session so new QR codes are generated.
    pub(super) logged_out: Arc<AtomicBool>,
}

impl WhatsAppTransport {
    /// Create a new WhatsApp transport from config.
    pub fn new(config: WhatsAppConfig, data_dir: &str) -> Self {
        Self {
            config,
            data_dir: data_dir.to_string(),
            client: Arc::new(Mutex::new(None)),
            sent_ids: Arc::new(Mutex::new(HashSet::new())),
            logged_out: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Directory holding the persisted session.
    pub fn session_dir(&self) -> PathBuf {
        let dir = herald_core::config::shellexpand(&self.data_dir);
        PathBuf::from(dir).join("whatsapp_session")
    }

    /// Marker written once the phone has linked this device. The store file
    /// alone is not enough: the library creates it before pairing completes.
    pub(super) fn linked_marker(&self) -> PathBuf {
        self.session_dir().join("linked")
    }

    /// Get the session database path, creating its directory.
    pub(super) fn session_db_path(&self) -> String {
        let session_dir = self.session_dir();
        let _ = std::fs::create_dir_all(&session_dir);
        session_dir.join("whatsapp.db").to_string_lossy().into_owned()
    }
}
