//! Progress reporter: the single outlet from the core to its observer.

use herald_core::event::Event;
use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable sink for [`Event`]s.
///
/// Backed by a bounded channel; a slow observer applies backpressure to the
/// job worker.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::Sender<Event>,
}

impl Reporter {
    /// Create a reporter and the receiver the observer drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Push one event. A dropped observer is not an error for the core.
    pub async fn emit(&self, event: Event) {
        let name = event.name();
        if self.tx.send(event).await.is_err() {
            debug!("event receiver dropped, discarding {name}");
        }
    }
}
