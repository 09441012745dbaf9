//! Remote media fetching into scoped temporary files.

use herald_core::error::HeraldError;
use tempfile::NamedTempFile;
use tracing::debug;

pub(super) fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// File extension of the URL's last path segment, with the leading dot.
///
/// Kept on the temp file so the transport can still guess the MIME type.
pub(super) fn url_extension(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            let segment = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = segment.rsplit_once('.')?;
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then(|| format!(".{ext}"))
        })
        .unwrap_or_default()
}

/// Download `url` into a temporary file. The file is deleted when the
/// returned handle is dropped or closed, including on every error path here.
pub(super) async fn download(
    http: &reqwest::Client,
    url: &str,
) -> Result<NamedTempFile, HeraldError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| HeraldError::Download(format!("{url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(HeraldError::Download(format!("{url}: HTTP {}", resp.status())));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| HeraldError::Download(format!("{url}: {e}")))?;

    let file = tempfile::Builder::new()
        .prefix("herald-media-")
        .suffix(&url_extension(url))
        .tempfile()
        .map_err(|e| HeraldError::Download(format!("cannot create temp file: {e}")))?;

    tokio::fs::write(file.path(), &bytes)
        .await
        .map_err(|e| HeraldError::Download(format!("cannot write temp file: {e}")))?;

    debug!("downloaded {} bytes from {url} to {}", bytes.len(), file.path().display());
    Ok(file)
}
