//! Incoming WhatsApp message handling: filtering and unwrapping.

use herald_core::event::InboundMessage;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Turn an incoming message event into an [`InboundMessage`].
///
/// Only 1:1 text from other people is forwarded; group traffic, our own
/// sends (and their echoes), and media without a caption are dropped.
pub(super) async fn inbound_message(
    msg: &waproto::whatsapp::Message,
    info: &wacore::types::message::MessageInfo,
    sent_ids: &Arc<Mutex<HashSet<String>>>,
) -> Option<InboundMessage> {
    if info.source.is_group {
        debug!("WA filtered: ignoring group message");
        return None;
    }
    if sent_ids.lock().await.remove(&info.id) {
        debug!("skipping own echo: {}", info.id);
        return None;
    }
    if info.source.is_from_me {
        return None;
    }

    // Unwrap nested wrappers (device_sent, ephemeral, view_once).
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg);

    let text = inner
        .conversation
        .as_deref()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .or_else(|| inner.image_message.as_ref().and_then(|i| i.caption.as_deref()))
        .unwrap_or("");

    if text.is_empty() {
        return None;
    }

    let phone = info.source.sender.user.clone();
    let sender_name = (!info.push_name.is_empty()).then(|| info.push_name.clone());

    Some(InboundMessage {
        id: info.id.clone(),
        from: phone,
        sender_name,
        text: text.to_string(),
        timestamp: chrono::Utc::now(),
    })
}
