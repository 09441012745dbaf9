//! Session manager: the connection/authentication state machine in front of
//! one messaging transport.
//!
//! ```text
//! Uninitialized ──connect──► AwaitingAuth ──Paired──► Authenticating ──Ready──► Ready
//!       │  (stored credential)                 ▲
//!       └──────────────connect─────────────────┘
//! Disconnected ──connect──► AwaitingAuth | Authenticating
//! any ──disconnect()──► Disconnected
//! any but Errored ──Disconnected signal──► Disconnected
//! AwaitingAuth | Authenticating ──AuthFailure──► Errored ──connect──► Uninitialized ...
//! ```

mod media;


use crate::{lock, reporter::Reporter};
use herald_core::{
    error::HeraldError,
    event::{Event, SessionStatus},
    traits::{Transport, TransportEvent},
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared between the manager and its event pump.
struct Shared {
    status: watch::Sender<SessionStatus>,
    last_error: Mutex<Option<String>>,
    /// Latest pairing challenge, kept until the session is Ready.
    last_challenge: Mutex<Option<String>>,
    reporter: Reporter,
}

impl Shared {
    async fn transition(&self, to: SessionStatus) {
        let from = self.status.send_replace(to);
        if from != to {
            info!("session: {from} -> {to}");
            self.reporter.emit(Event::StatusChange(to)).await;
        }
    }

    async fn handle(&self, event: TransportEvent) {
        let current = *self.status.borrow();
        match event {
            TransportEvent::Challenge(code) => {
                if current == SessionStatus::Ready || current == SessionStatus::Errored {
                    debug!("session: ignoring pairing challenge while {current}");
                    return;
                }
                *lock(&self.last_challenge) = Some(code.clone());
                self.transition(SessionStatus::AwaitingAuth).await;
                self.reporter.emit(Event::QrCode(code)).await;
            }
            TransportEvent::Paired => {
                if current == SessionStatus::AwaitingAuth {
                    self.transition(SessionStatus::Authenticating).await;
                }
            }
            TransportEvent::Ready => {
                if current == SessionStatus::Errored {
                    debug!("session: ignoring ready signal on errored session");
                    return;
                }
                *lock(&self.last_challenge) = None;
                *lock(&self.last_error) = None;
                self.transition(SessionStatus::Ready).await;
            }
            TransportEvent::Disconnected(reason) => {
                if current == SessionStatus::Errored {
                    debug!("session: ignoring disconnect signal on errored session: {reason}");
                    return;
                }
                warn!("session: transport disconnected: {reason}");
                self.transition(SessionStatus::Disconnected).await;
            }
            TransportEvent::AuthFailure(reason) => {
                error!("session: {}", HeraldError::AuthFailure(reason.clone()));
                *lock(&self.last_error) = Some(reason);
                *lock(&self.last_challenge) = None;
                let next = if current.is_connecting() {
                    SessionStatus::Errored
                } else {
                    SessionStatus::Disconnected
                };
                self.transition(next).await;
            }
            TransportEvent::Message(message) => {
                self.reporter.emit(Event::MessageReceived(message)).await;
            }
        }
    }
}

/// Owns the lifecycle of one connection to the messaging transport.
///
/// Construct once at startup and share behind an `Arc`.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    /// Serializes connect/disconnect so only one transport instance runs.
    lifecycle: tokio::sync::Mutex<()>,
    pump: Mutex<Option<JoinHandle<()>>>,
    http: reqwest::Client,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, reporter: Reporter) -> Self {
        let (status, _) = watch::channel(SessionStatus::Uninitialized);
        Self {
            transport,
            shared: Arc::new(Shared {
                status,
                last_error: Mutex::new(None),
                last_challenge: Mutex::new(None),
                reporter,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            pump: Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Watch status changes without going through the reporter.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Reason for the last auth failure, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// The pairing challenge still waiting to be scanned, if any.
    pub fn pending_challenge(&self) -> Option<String> {
        lock(&self.shared.last_challenge).clone()
    }

    /// Start the transport and drive the session toward Ready.
    ///
    /// Returns the status reached when the call returns; Ready usually
    /// arrives later as a `status-change` event. Calling this while a
    /// connection attempt is already in flight is a no-op.
    pub async fn connect(&self) -> Result<SessionStatus, HeraldError> {
        let _guard = self.lifecycle.lock().await;

        let current = self.status();
        if current == SessionStatus::Ready {
            return Err(HeraldError::AlreadyConnected);
        }
        if current.is_connecting() {
            debug!("session: connect while {current}, keeping current attempt");
            return Ok(current);
        }

        let stale = lock(&self.pump).take();
        if let Some(old) = stale {
            old.abort();
            if let Err(e) = self.transport.disconnect().await {
                warn!("session: stale transport teardown failed: {e}");
            }
        }
        if current == SessionStatus::Errored {
            self.shared.transition(SessionStatus::Uninitialized).await;
        }
        *lock(&self.shared.last_error) = None;

        let next = if self.transport.has_credentials().await {
            SessionStatus::Authenticating
        } else {
            SessionStatus::AwaitingAuth
        };
        self.shared.transition(next).await;

        let (tx, mut rx) = mpsc::channel::<TransportEvent>(32);
        let shared = self.shared.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle(event).await;
            }
        });
        *lock(&self.pump) = Some(pump);

        info!("session: connecting via {}", self.transport.name());
        if let Err(e) = self.transport.connect(tx).await {
            error!("session: transport failed to start: {e}");
            let pump = lock(&self.pump).take();
            if let Some(pump) = pump {
                pump.abort();
            }
            *lock(&self.shared.last_error) = Some(e.to_string());
            self.shared.transition(SessionStatus::Errored).await;
            return Err(e);
        }

        Ok(self.status())
    }

    /// Tear the transport down. Always ends in Disconnected; teardown errors
    /// are logged, not returned.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;

        let pump = lock(&self.pump).take();
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!("session: transport teardown failed: {e}");
        }
        *lock(&self.shared.last_challenge) = None;
        self.shared.transition(SessionStatus::Disconnected).await;
    }

    fn ensure_ready(&self) -> Result<(), HeraldError> {
        match self.status() {
            SessionStatus::Ready => Ok(()),
            other => Err(HeraldError::NotReady(other)),
        }
    }

    /// Send a text message to a canonical address.
    pub async fn send_text(&self, address: &str, content: &str) -> Result<(), HeraldError> {
        self.ensure_ready()?;
        self.transport
            .send_text(address, content)
            .await
            .map_err(into_delivery)
    }

    /// Send `content` with an attachment.
    ///
    /// `media_source` is a local path, sent as is, or an http(s) URL, fetched
    /// into a temporary file that is removed before this returns.
    pub async fn send_media(
        &self,
        address: &str,
        content: &str,
        media_source: &str,
    ) -> Result<(), HeraldError> {
        self.ensure_ready()?;

        if !media::is_remote(media_source) {
            return self
                .transport
                .send_media(address, content, Path::new(media_source))
                .await
                .map_err(into_delivery);
        }

        let file = media::download(&self.http, media_source).await?;
        let result = self
            .transport
            .send_media(address, content, file.path())
            .await
            .map_err(into_delivery);
        if let Err(e) = file.close() {
            warn!("session: failed to remove downloaded media: {e}");
        }
        result
    }
}

/// Anything the transport reports while sending is a delivery failure.
fn into_delivery(e: HeraldError) -> HeraldError {
    match e {
        HeraldError::Delivery(_) => e,
        other => HeraldError::Delivery(other.to_string()),
    }
}
