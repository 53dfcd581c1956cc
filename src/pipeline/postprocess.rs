use reqwest::Client;
use tracing::{info, warn};

use crate::config::PostProcessConfig;
use crate::error::PostProcessError;
use crate::media::codec::rotate_clockwise_90;
use crate::media::download::download_image;
use crate::media::{HostedImage, ImageHost};
use crate::utils::cancel::RunContext;
use crate::utils::http::{get_http_client, truncate_for_log};

/// Turns a raw generation result upright and republishes it.
#[derive(Debug, Clone)]
pub struct ResultPostProcessor {
    config: PostProcessConfig,
    host: ImageHost,
    client: Client,
}

impl ResultPostProcessor {
    pub fn new(config: PostProcessConfig, host: ImageHost) -> Self {
        Self::with_client(config, host, get_http_client().clone())
    }

    pub fn with_client(config: PostProcessConfig, host: ImageHost, client: Client) -> Self {
        ResultPostProcessor {
            config,
            host,
            client,
        }
    }

    /// Callers keep using `result_url` unrotated when this fails.
    pub async fn finalize(&self, result_url: &str, ctx: &RunContext) -> Result<String, PostProcessError> {
        info!("Fetching generated image {}", truncate_for_log(result_url, 80));
        let bytes = ctx
            .guard(download_image(&self.client, result_url, self.config.fetch_timeout))
            .await
            .map_err(PostProcessError::Interrupted)?
            .map_err(PostProcessError::Fetch)?;

        let rotated = rotate_clockwise_90(&bytes)?;

        let hosted = self
            .host
            .upload(&rotated, ctx)
            .await
            .map_err(PostProcessError::Interrupted)?;
        match hosted {
            HostedImage::Hosted { url } => {
                info!("Published rotated result: {}", truncate_for_log(&url, 80));
                Ok(url)
            }
            HostedImage::LocalFallback { path, .. } => {
                warn!("Rotated result only saved locally at {}", path.display());
                Err(PostProcessError::Unreachable(path.display().to_string()))
            }
        }
    }
}
