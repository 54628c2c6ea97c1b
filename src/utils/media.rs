use anyhow::{Context, Result};
use url::Url;

/// True when the reference needs an HTTP fetch rather than a filesystem read.
pub fn is_remote(media_ref: &str) -> bool {
    matches!(Url::parse(media_ref), Ok(url) if url.scheme() == "http" || url.scheme() == "https")
}

/// Resolves a preview media reference to raw bytes.
pub async fn load_media_bytes(client: &reqwest::Client, media_ref: &str) -> Result<Vec<u8>> {
    if is_remote(media_ref) {
        let bytes = client
            .get(media_ref)
            .send()
            .await
            .with_context(|| format!("Failed to fetch preview media {}", media_ref))?
            .error_for_status()
            .context("Preview media request rejected")?
            .bytes()
            .await
            .context("Failed to read preview media body")?;
        Ok(bytes.to_vec())
    } else {
        tokio::fs::read(media_ref)
            .await
            .with_context(|| format!("Failed to read preview media {}", media_ref))
    }
}
