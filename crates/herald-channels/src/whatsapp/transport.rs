//! Transport trait implementation for WhatsApp.

use super::send::{build_media_message, parse_jid, retry_send};
use super::WhatsAppTransport;
use async_trait::async_trait;
use herald_core::{
    error::HeraldError,
    traits::{Transport, TransportEvent},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use whatsapp_rust::client::Client;

impl WhatsAppTransport {
    async fn connected_client(&self) -> Result<Arc<Client>, HeraldError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| HeraldError::Delivery("whatsapp client not connected".into()))
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn has_credentials(&self) -> bool {
        !self.logged_out.load(std::sync::atomic::Ordering::SeqCst)
            && self.session_dir().join("whatsapp.db").exists()
            && self.linked_marker().exists()
    }

    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<(), HeraldError> {
        self.discard_stale_session();
        self.build_and_run_bot(events).await?;
        info!("WhatsApp transport started");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HeraldError> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.disconnect().await;
        }
        self.sent_ids.lock().await.clear();
        info!("WhatsApp transport stopped");
        Ok(())
    }

    async fn send_text(&self, address: &str, content: &str) -> Result<(), HeraldError> {
        let client = self.connected_client().await?;
        let jid = parse_jid(address)?;
        let msg = waproto::whatsapp::Message {
            conversation: Some(content.to_string()),
            ..Default::default()
        };
        let msg_id = retry_send(&client, &jid, msg).await?;
        // Track sent message ID to ignore our own echo.
        self.sent_ids.lock().await.insert(msg_id);
        Ok(())
    }

    async fn send_media(
        &self,
        address: &str,
        caption: &str,
        path: &Path,
    ) -> Result<(), HeraldError> {
        let client = self.connected_client().await?;
        let jid = parse_jid(address)?;
        let msg = build_media_message(&client, path, caption).await?;
        let msg_id = retry_send(&client, &jid, msg).await?;
        self.sent_ids.lock().await.insert(msg_id);
        Ok(())
    }
}
