//! Outbound delivery: retry with backoff, and media classification/upload.

use herald_core::error::HeraldError;
use std::path::Path;
use tracing::{error, warn};
use wacore_binary::jid::Jid;
use whatsapp_rust::client::Client;
use whatsapp_rust::download::MediaType;

/// Retry delays for exponential backoff: 500ms, 1s, 2s.
pub(super) const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// Send a WhatsApp message with retry and exponential backoff.
///
/// Attempts up to 3 times with delays of 500ms, 1s, 2s between retries.
pub(super) async fn retry_send(
    client: &Client,
    jid: &Jid,
    msg: waproto::whatsapp::Message,
) -> Result<String, HeraldError> {
    let mut last_err = None;

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match client.send_message(jid.clone(), msg.clone()).await {
            Ok(msg_id) => return Ok(msg_id),
            Err(e) => {
                let attempt_num = attempt + 1;
                if attempt_num < RETRY_DELAYS_MS.len() {
                    warn!(
                        "whatsapp send to {jid} attempt {attempt_num}/{} failed: {e}, retrying in {delay_ms}ms",
                        RETRY_DELAYS_MS.len()
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                } else {
                    error!(
                        "whatsapp send to {jid} attempt {attempt_num}/{} failed: {e}, giving up",
                        RETRY_DELAYS_MS.len()
                    );
                }
                last_err = Some(e);
            }
        }
    }

    Err(HeraldError::Delivery(format!(
        "whatsapp send failed after {} attempts: {}",
        RETRY_DELAYS_MS.len(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Parse a canonical address into a JID.
pub(super) fn parse_jid(address: &str) -> Result<Jid, HeraldError> {
    address
        .parse()
        .map_err(|e| HeraldError::Delivery(format!("invalid whatsapp JID '{address}': {e}")))
}

/// How an attachment is presented in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    /// Classify by MIME type. Anything not an image or video goes out as a document.
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next() {
            Some("image") => Self::Image,
            Some("video") => Self::Video,
            _ => Self::Document,
        }
    }

    fn media_type(self) -> MediaType {
        match self {
            Self::Image => MediaType::Image,
            Self::Video => MediaType::Video,
            Self::Document => MediaType::Document,
        }
    }
}

/// MIME type and kind for a file, guessed from its extension.
pub(super) fn classify(path: &Path) -> (MediaKind, String) {
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    (MediaKind::from_mime(&mime), mime)
}

/// Upload a file and build the media message that references it.
pub(super) async fn build_media_message(
    client: &Client,
    path: &Path,
    caption: &str,
) -> Result<waproto::whatsapp::Message, HeraldError> {
    use waproto::whatsapp::message::{DocumentMessage, ImageMessage, VideoMessage};

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        HeraldError::Delivery(format!("cannot read attachment {}: {e}", path.display()))
    })?;
    let (kind, mimetype) = classify(path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let caption = (!caption.is_empty()).then(|| caption.to_string());

    let upload = client
        .upload(bytes, kind.media_type())
        .await
        .map_err(|e| HeraldError::Delivery(format!("whatsapp media upload failed: {e}")))?;

    let msg = match kind {
        MediaKind::Image => waproto::whatsapp::Message {
            image_message: Some(Box::new(ImageMessage {
                mimetype: Some(mimetype),
                caption,
                url: Some(upload.url),
                direct_path: Some(upload.direct_path),
                media_key: Some(upload.media_key),
                file_enc_sha256: Some(upload.file_enc_sha256),
                file_sha256: Some(upload.file_sha256),
                file_length: Some(upload.file_length),
                ..Default::default()
            })),
            ..Default::default()
        },
        MediaKind::Video => waproto::whatsapp::Message {
            video_message: Some(Box::new(VideoMessage {
                mimetype: Some(mimetype),
                caption,
                url: Some(upload.url),
                direct_path: Some(upload.direct_path),
                media_key: Some(upload.media_key),
                file_enc_sha256: Some(upload.file_enc_sha256),
                file_sha256: Some(upload.file_sha256),
                file_length: Some(upload.file_length),
                ..Default::default()
            })),
            ..Default::default()
        },
        MediaKind::Document => waproto::whatsapp::Message {
            document_message: Some(Box::new(DocumentMessage {
                mimetype: Some(mimetype),
                title: Some(file_name.clone()),
                file_name: Some(file_name),
                caption,
                url: Some(upload.url),
                direct_path: Some(upload.direct_path),
                media_key: Some(upload.media_key),
                file_enc_sha256: Some(upload.file_enc_sha256),
                file_sha256: Some(upload.file_sha256),
                file_length: Some(upload.file_length),
                ..Default::default()
            })),
            ..Default::default()
        },
    };

    Ok(msg)
}
