use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::media::codec::UploadLimits;

// Anonymous upload client id published for the public image host.
const DEFAULT_IMAGE_HOST_CLIENT_ID: &str = "546c25a59c58ad7";

#[derive(Debug, Clone)]
pub struct Config {
    pub nanobanana_api_key: String,
    pub nanobanana_base_url: String,
    pub nanobanana_callback_url: String,
    pub generation_poll_interval_ms: u64,
    pub generation_poll_max_attempts: usize,
    pub generation_submit_timeout_seconds: u64,
    pub generation_poll_timeout_seconds: u64,
    pub image_host_endpoint: String,
    pub image_host_client_id: String,
    pub image_host_timeout_seconds: u64,
    pub uploads_dir: PathBuf,
    pub public_base_url: String,
    pub result_fetch_timeout_seconds: u64,
    pub max_upload_bytes: usize,
    pub max_image_dimension: u32,
}

/// Settings for talking to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub base_url: String,
    pub callback_url: String,
    pub poll_interval: Duration,
    pub max_attempts: usize,
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
}

impl GenerationConfig {
    /// Wall-clock budget of the whole poll loop, excluding request latency.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval
            .saturating_mul(u32::try_from(self.max_attempts).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone)]
pub struct ImageHostConfig {
    pub endpoint: String,
    pub client_id: String,
    pub timeout: Duration,
    pub uploads_dir: PathBuf,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct PostProcessConfig {
    pub fetch_timeout: Duration,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// Read ahead of [`Config::load`] so logging is up before config warnings.
pub fn log_level_from_env() -> String {
    env_string("LOG_LEVEL", "info").to_lowercase()
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let nanobanana_api_key = env_string("NANOBANANA_API_KEY", "");
        if nanobanana_api_key.trim().is_empty() {
            warn!("NANOBANANA_API_KEY is not set; outfit images will not be generated");
        }

        let mut generation_poll_max_attempts = env_usize("GENERATION_POLL_MAX_ATTEMPTS", 90);
        if generation_poll_max_attempts == 0 {
            warn!("GENERATION_POLL_MAX_ATTEMPTS must be positive; using 90");
            generation_poll_max_attempts = 90;
        }

        let max_image_dimension = u32::try_from(env_u64("MAX_IMAGE_DIMENSION", 1024))
            .unwrap_or(1024)
            .max(1);

        Ok(Config {
            nanobanana_api_key,
            nanobanana_base_url: normalize_base_url(env_string(
                "NANOBANANA_BASE_URL",
                "https://api.nanobananaapi.ai/api/v1/nanobanana",
            )),
            nanobanana_callback_url: env_string(
                "NANOBANANA_CALLBACK_URL",
                "https://nanobanana-callback.example.com/webhook",
            ),
            generation_poll_interval_ms: env_u64("GENERATION_POLL_INTERVAL_MS", 2000),
            generation_poll_max_attempts,
            generation_submit_timeout_seconds: env_u64("GENERATION_SUBMIT_TIMEOUT_SECONDS", 30),
            generation_poll_timeout_seconds: env_u64("GENERATION_POLL_TIMEOUT_SECONDS", 10),
            image_host_endpoint: env_string("IMAGE_HOST_ENDPOINT", "https://api.imgur.com/3/image"),
            image_host_client_id: env_string("IMAGE_HOST_CLIENT_ID", DEFAULT_IMAGE_HOST_CLIENT_ID),
            image_host_timeout_seconds: env_u64("IMAGE_HOST_TIMEOUT_SECONDS", 30),
            uploads_dir: PathBuf::from(env_string("UPLOADS_DIR", "uploads")),
            public_base_url: normalize_base_url(env_string(
                "PUBLIC_BASE_URL",
                "http://localhost:8000",
            )),
            result_fetch_timeout_seconds: env_u64("RESULT_FETCH_TIMEOUT_SECONDS", 30),
            max_upload_bytes: env_usize("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            max_image_dimension,
        })
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            api_key: self.nanobanana_api_key.clone(),
            base_url: self.nanobanana_base_url.clone(),
            callback_url: self.nanobanana_callback_url.clone(),
            poll_interval: Duration::from_millis(self.generation_poll_interval_ms),
            max_attempts: self.generation_poll_max_attempts,
            submit_timeout: Duration::from_secs(self.generation_submit_timeout_seconds),
            poll_timeout: Duration::from_secs(self.generation_poll_timeout_seconds),
        }
    }

    pub fn image_host(&self) -> ImageHostConfig {
        ImageHostConfig {
            endpoint: self.image_host_endpoint.clone(),
            client_id: self.image_host_client_id.clone(),
            timeout: Duration::from_secs(self.image_host_timeout_seconds),
            uploads_dir: self.uploads_dir.clone(),
            public_base_url: self.public_base_url.clone(),
        }
    }

    pub fn post_process(&self) -> PostProcessConfig {
        PostProcessConfig {
            fetch_timeout: Duration::from_secs(self.result_fetch_timeout_seconds),
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_bytes: self.max_upload_bytes,
            max_dimension: self.max_image_dimension,
        }
    }
}
