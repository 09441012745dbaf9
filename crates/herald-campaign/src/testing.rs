//! Scripted transport and helpers shared by the session and processor tests.

use crate::{lock, reporter::Reporter, session::SessionManager};
use async_trait::async_trait;
use herald_core::{
    error::HeraldError,
    event::{Event, SessionStatus},
    traits::{Transport, TransportEvent},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// One recorded send.
#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub address: String,
    pub content: String,
    pub media: Option<PathBuf>,
    /// Whether the media file existed when the transport was called.
    pub media_existed: bool,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    pub credentials: AtomicBool,
    /// Push `Ready` as soon as `connect` is called.
    pub auto_ready: AtomicBool,
    pub fail_connect: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    fail_addresses: Mutex<HashSet<String>>,
    sent: Mutex<Vec<Sent>>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl FakeTransport {
    /// Paired transport that comes up immediately.
    pub fn paired() -> Arc<Self> {
        let t = Self::default();
        t.credentials.store(true, Ordering::SeqCst);
        t.auto_ready.store(true, Ordering::SeqCst);
        Arc::new(t)
    }

    /// Transport with no stored credential; the test drives pairing.
    pub fn unpaired() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, address: &str) {
        lock(&self.fail_addresses).insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    /// Push a signal as if the transport produced it.
    pub async fn push(&self, event: TransportEvent) {
        let tx = lock(&self.events).clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    fn record(&self, address: &str, content: &str, media: Option<&Path>) -> Result<(), HeraldError> {
        lock(&self.sent).push(Sent {
            address: address.to_string(),
            content: content.to_string(),
            media: media.map(Path::to_path_buf),
            media_existed: media.is_some_and(Path::exists),
        });
        if lock(&self.fail_addresses).contains(address) {
            return Err(HeraldError::Delivery(format!("simulated failure for {address}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn has_credentials(&self) -> bool {
        self.credentials.load(Ordering::SeqCst)
    }

    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), HeraldError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(HeraldError::Channel("simulated start failure".into()));
        }
        if self.auto_ready.load(Ordering::SeqCst) {
            let _ = events.send(TransportEvent::Ready).await;
        }
        *lock(&self.events) = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HeraldError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.events) = None;
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(HeraldError::Channel("simulated teardown failure".into()));
        }
        Ok(())
    }

    async fn send_text(&self, address: &str, content: &str) -> Result<(), HeraldError> {
        self.record(address, content, None)
    }

    async fn send_media(&self, address: &str, caption: &str, path: &Path) -> Result<(), HeraldError> {
        self.record(address, caption, Some(path))
    }
}

pub(crate) fn session_with(transport: Arc<FakeTransport>) -> (Arc<SessionManager>, mpsc::Receiver<Event>) {
    let (reporter, rx) = Reporter::channel(1024);
    (Arc::new(SessionManager::new(transport, reporter)), rx)
}

/// Wait until the session reaches `status`.
pub(crate) async fn wait_for_status(session: &SessionManager, status: SessionStatus) {
    let mut rx = session.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {status}, at {}", session.status()))
        .unwrap();
}

/// Receive events until one matches, returning it.
pub(crate) async fn next_matching(
    rx: &mut mpsc::Receiver<Event>,
    mut matches: impl FnMut(&Event) -> bool,
) -> Event {
    tokio::time::timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            if matches(&event) {
                return event;
            }
        }
        panic!("event channel closed");
    })
    .await
    .expect("timed out waiting for event")
}

/// Everything currently buffered on the channel.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
