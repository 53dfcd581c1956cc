use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use crate::utils::http::truncate_for_log;

const DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

/// Fetches `url` once with a per-request timeout. Errors are rendered for
/// logging; callers decide what a failed download means.
pub async fn download_image(client: &Client, url: &str, timeout: Duration) -> Result<Vec<u8>, String> {
    let response = match client.get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(err) => {
            warn!(
                "Failed to fetch image {url}: {err} (timeout={}, connect={}, status={:?})",
                err.is_timeout(),
                err.is_connect(),
                err.status()
            );
            return Err(err.to_string());
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Image download failed for {url} with status {}: {}",
            status,
            truncate_for_log(&body, DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return Err(format!("HTTP {status}"));
    }

    match response.bytes().await {
        Ok(bytes) if bytes.is_empty() => Err("empty response body".to_string()),
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(err) => {
            warn!("Failed to read image bytes {url}: {err}");
            Err(err.to_string())
        }
    }
}
