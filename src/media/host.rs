use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ImageHostConfig;
use crate::media::codec::{detect_mime_type, normalize_orientation};
use crate::utils::cancel::{Interrupted, RunContext};
use crate::utils::http::{get_http_client, truncate_for_log};

const HOST_ERROR_BODY_LIMIT: usize = 400;

static UPLOAD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct HostUploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<HostUploadData>,
}

#[derive(Debug, Deserialize)]
struct HostUploadData {
    link: Option<String>,
}

/// Where an uploaded image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostedImage {
    /// Publicly reachable HTTPS URL.
    Hosted { url: String },
    /// Only the local copy exists; `url` is served by this machine and may be
    /// unreachable from the outside.
    LocalFallback { path: PathBuf, url: String },
}

impl HostedImage {
    pub fn url(&self) -> &str {
        match self {
            Self::Hosted { url } | Self::LocalFallback { url, .. } => url,
        }
    }

    pub fn is_fallback_local(&self) -> bool {
        matches!(self, Self::LocalFallback { .. })
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Hosted { url } => Some(url),
            Self::LocalFallback { .. } => None,
        }
    }
}

pub fn force_https(link: &str) -> String {
    match Url::parse(link) {
        Ok(mut url) if url.scheme() == "http" => {
            if url.set_scheme("https").is_err() {
                return link.to_string();
            }
            url.into()
        }
        _ => link.to_string(),
    }
}

fn backup_file_name() -> String {
    let sequence = UPLOAD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "temp_{}_{}.jpg",
        chrono::Utc::now().format("%Y%m%d%H%M%S%3f"),
        sequence
    )
}

/// Publishes images to the configured public host, keeping a local copy of
/// every upload under `uploads_dir`.
#[derive(Debug, Clone)]
pub struct ImageHost {
    config: ImageHostConfig,
    client: Client,
}

impl ImageHost {
    pub fn new(config: ImageHostConfig) -> Self {
        Self::with_client(config, get_http_client().clone())
    }

    pub fn with_client(config: ImageHostConfig, client: Client) -> Self {
        ImageHost { config, client }
    }

    /// Only an interruption is an error; every other failure degrades to
    /// [`HostedImage::LocalFallback`].
    pub async fn upload(
        &self,
        image_bytes: &[u8],
        ctx: &RunContext,
    ) -> Result<HostedImage, Interrupted> {
        ctx.check()?;
        let normalized = normalize_orientation(image_bytes);
        match (&normalized.warning, normalized.orientation) {
            (Some(warning), _) => warn!("Uploading image as received: {warning}"),
            (None, Some(orientation)) => debug!("Normalized upload orientation from {orientation:?}"),
            (None, None) => {}
        }

        let file_name = backup_file_name();
        let path = self.config.uploads_dir.join(&file_name);
        if let Err(err) = persist_copy(&path, &normalized.bytes).await {
            warn!("Failed to save local copy {}: {err}", path.display());
        } else {
            info!(
                "Saved local copy of upload: {} ({})",
                path.display(),
                detect_mime_type(&normalized.bytes).unwrap_or_else(|| "unknown type".to_string())
            );
        }

        let hosted = match self.upload_remote(&normalized.bytes, ctx).await? {
            Some(url) => {
                info!("Uploaded image to public host: {}", truncate_for_log(&url, 80));
                HostedImage::Hosted { url }
            }
            None => {
                let url = format!("{}/uploads/{}", self.config.public_base_url, file_name);
                warn!("Public upload failed; falling back to local URL {url} (may be unreachable)");
                HostedImage::LocalFallback { path, url }
            }
        };
        Ok(hosted)
    }

    async fn upload_remote(
        &self,
        image_bytes: &[u8],
        ctx: &RunContext,
    ) -> Result<Option<String>, Interrupted> {
        if self.config.client_id.trim().is_empty() {
            warn!("Image host client id is not configured");
            return Ok(None);
        }

        let encoded = general_purpose::STANDARD.encode(image_bytes);
        let request = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Client-ID {}", self.config.client_id))
            .timeout(self.config.timeout)
            .form(&[("image", encoded.as_str()), ("type", "base64")])
            .send();

        let response = match ctx.guard(request).await? {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "Image host request failed: {err} (timeout={}, connect={})",
                    err.is_timeout(),
                    err.is_connect()
                );
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = ctx.guard(response.text()).await?.unwrap_or_default();
            warn!(
                "Image host upload failed with status {}: {}",
                status,
                truncate_for_log(&body, HOST_ERROR_BODY_LIMIT)
            );
            return Ok(None);
        }

        let parsed = match ctx.guard(response.json::<HostUploadResponse>()).await? {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Image host returned an unreadable body: {err}");
                return Ok(None);
            }
        };

        if !parsed.success {
            warn!("Image host reported failure");
            return Ok(None);
        }

        Ok(parsed
            .data
            .and_then(|data| data.link)
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty())
            .map(|link| force_https(&link)))
    }
}

async fn persist_copy(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}
