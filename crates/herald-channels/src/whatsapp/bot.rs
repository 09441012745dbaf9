//! Bot lifecycle: building and running the WhatsApp bot.

use super::events::inbound_message;
use super::WhatsAppTransport;
use herald_core::{error::HeraldError, traits::TransportEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

impl WhatsAppTransport {
    /// Delete a session the phone has unlinked, or one whose pairing was
    /// abandoned before the device was linked.
    ///
    /// The library won't generate new QR codes with stale keys, so the next
    /// bot must start from an empty store.
    pub(super) fn discard_stale_session(&self) {
        let logged_out = self.logged_out.swap(false, Ordering::SeqCst);
        let session_dir = self.session_dir();
        let abandoned =
            session_dir.join("whatsapp.db").exists() && !self.linked_marker().exists();
        if !logged_out && !abandoned {
            return;
        }
        if session_dir.exists() {
            info!("deleting stale WhatsApp session at {}", session_dir.display());
            if let Err(e) = std::fs::remove_dir_all(&session_dir) {
                warn!("failed to delete stale WhatsApp session: {e}");
            }
        }
    }

    /// Build a WhatsApp bot that forwards connection signals into `events`,
    /// and run it in the background.
    pub(super) async fn build_and_run_bot(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), HeraldError> {
        let db_path = self.session_db_path();
        let client_handle = self.client.clone();

        info!("WhatsApp bot building (session: {db_path})...");

        let backend = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .map_err(|e| HeraldError::Channel(format!("whatsapp store init failed: {e}")))?,
        );

        let client_for_event = client_handle.clone();
        let sent_ids_for_event = self.sent_ids.clone();
        let logged_out_for_event = self.logged_out.clone();
        let marker_for_event = self.linked_marker();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.config.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let tx = events.clone();
                let client_store = client_for_event.clone();
                let sent_ids = sent_ids_for_event.clone();
                let logged_out = logged_out_for_event.clone();
                let marker = marker_for_event.clone();
                async move {
                    let signal = match event {
                        Event::PairingQrCode { code, .. } => {
                            info!("WhatsApp QR code generated (scan to pair)");
                            debug!("QR data: {code}");
                            TransportEvent::Challenge(code)
                        }
                        Event::PairSuccess(_) => {
                            info!("WhatsApp pairing successful!");
                            TransportEvent::Paired
                        }
                        Event::Connected(_) => {
                            info!("WhatsApp connected");
                            if let Err(e) = std::fs::write(&marker, b"") {
                                warn!("failed to mark WhatsApp session as linked: {e}");
                            }
                            *client_store.lock().await = Some(client);
                            TransportEvent::Ready
                        }
                        Event::Disconnected(_) => {
                            warn!("WhatsApp disconnected");
                            *client_store.lock().await = None;
                            TransportEvent::Disconnected("connection lost".to_string())
                        }
                        Event::LoggedOut(_) => {
                            warn!("WhatsApp logged out, session invalidated");
                            *client_store.lock().await = None;
                            logged_out.store(true, Ordering::SeqCst);
                            let _ = std::fs::remove_file(&marker);
                            TransportEvent::AuthFailure(
                                "device was unlinked from the phone".to_string(),
                            )
                        }
                        Event::Message(msg, info) => {
                            match inbound_message(&msg, &info, &sent_ids).await {
                                Some(inbound) => TransportEvent::Message(inbound),
                                None => return,
                            }
                        }
                        _ => return,
                    };
                    if tx.send(signal).await.is_err() {
                        debug!("whatsapp event receiver dropped");
                    }
                }
            })
            .build()
            .await
            .map_err(|e| HeraldError::Channel(format!("whatsapp bot build failed: {e}")))?;

        // Store client reference immediately so disconnect can reach it.
        *client_handle.lock().await = Some(bot.client());

        // Run bot in background.
        let _handle = bot
            .run()
            .await
            .map_err(|e| HeraldError::Channel(format!("whatsapp bot run failed: {e}")))?;

        info!("WhatsApp bot started");
        Ok(())
    }
}
