use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GenerationError, InputError, PipelineError};
use crate::generation::{GenerationJobClient, OutfitItem};
use crate::media::ImageHost;
use crate::pipeline::postprocess::ResultPostProcessor;
use crate::utils::cancel::RunContext;
use crate::utils::timing::{complete_request_timer, log_stage_timing, start_request_timer};

pub fn validate_request(image_bytes: &[u8], items: &[OutfitItem]) -> Result<(), InputError> {
    if image_bytes.is_empty() {
        return Err(InputError::EmptyImage);
    }
    if items.is_empty() {
        return Err(InputError::NoRecommendations);
    }
    Ok(())
}

/// Runs one outfit image request: publish source, generate, fix rotation.
#[derive(Debug, Clone)]
pub struct OutfitImagePipeline {
    host: ImageHost,
    generator: GenerationJobClient,
    post_processor: ResultPostProcessor,
}

impl OutfitImagePipeline {
    pub fn new(
        host: ImageHost,
        generator: GenerationJobClient,
        post_processor: ResultPostProcessor,
    ) -> Self {
        OutfitImagePipeline {
            host,
            generator,
            post_processor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let host = ImageHost::new(config.image_host());
        let generator = GenerationJobClient::new(config.generation());
        let post_processor = ResultPostProcessor::new(config.post_process(), host.clone());
        Self::new(host, generator, post_processor)
    }

    pub fn generator(&self) -> &GenerationJobClient {
        &self.generator
    }

    /// Never fails: every problem is logged and reported as `None`.
    #[allow(dead_code)]
    pub async fn generate_outfit_image(
        &self,
        image_bytes: &[u8],
        items: &[OutfitItem],
        style: &str,
    ) -> Option<String> {
        self.generate_outfit_image_with(image_bytes, items, style, &RunContext::unbounded())
            .await
    }

    pub async fn generate_outfit_image_with(
        &self,
        image_bytes: &[u8],
        items: &[OutfitItem],
        style: &str,
        ctx: &RunContext,
    ) -> Option<String> {
        let mut timer = start_request_timer("outfit_image", style, items.len(), image_bytes.len());
        match self
            .try_generate_outfit_image(image_bytes, items, style, ctx)
            .await
        {
            Ok(url) => {
                complete_request_timer(&mut timer, "success", None);
                Some(url)
            }
            Err(err) => {
                warn!("No outfit image produced: {err}");
                complete_request_timer(&mut timer, "no_image", Some(err.to_string()));
                None
            }
        }
    }

    pub async fn try_generate_outfit_image(
        &self,
        image_bytes: &[u8],
        items: &[OutfitItem],
        style: &str,
        ctx: &RunContext,
    ) -> Result<String, PipelineError> {
        validate_request(image_bytes, items)?;

        let source = log_stage_timing(
            "image_host",
            "upload_source",
            Some(json!({ "bytes": image_bytes.len() })),
            || async {
                match self.host.upload(image_bytes, ctx).await {
                    Ok(source) if source.is_fallback_local() => {
                        Err(GenerationError::UnreachableSource(source.url().to_string()))
                    }
                    Ok(source) => Ok(source),
                    Err(interrupted) => Err(GenerationError::Interrupted(interrupted)),
                }
            },
        )
        .await?;

        let job = log_stage_timing(
            "generation",
            "run_job",
            Some(json!({ "style": style, "items": items.len() })),
            || self.generator.run(&source, items, style, ctx),
        )
        .await?;
        if let Some(message) = &job.error_message {
            warn!(
                task_id = %job.id,
                status = ?job.status,
                attempts = job.attempts,
                "Generation job ended without an image: {message}"
            );
        }
        let result_url = job.into_result()?;

        let finalized = log_stage_timing("post_process", "rotate_result", None, || {
            self.post_processor.finalize(&result_url, ctx)
        })
        .await;

        match finalized {
            Ok(url) => {
                info!("Outfit image ready: {url}");
                Ok(url)
            }
            Err(err) => {
                warn!("Post-processing failed, using unrotated result: {err}");
                Ok(result_url)
            }
        }
    }
}
