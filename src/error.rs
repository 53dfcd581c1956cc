use crate::utils::cancel::Interrupted;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Failures of a generation job, from submission through polling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation API key is not configured")]
    MissingApiKey,
    #[error("Source image is only available locally at {0}")]
    UnreachableSource(String),
    #[error("Generation submission failed: {0}")]
    Submission(String),
    #[error("Generation status request failed: {0}")]
    Transport(String),
    #[error("Generation API returned code {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Generation failed (flag={flag}): {message}")]
    GenerationFailed { flag: i64, message: String },
    #[error("Generation reported success without an image URL")]
    MalformedSuccess,
    #[error("Generation did not finish after {attempts} poll attempts")]
    PollTimeout { attempts: usize },
    #[error("Generation was interrupted: {0}")]
    Interrupted(Interrupted),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostProcessError {
    #[error("Failed to fetch result image: {0}")]
    Fetch(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Rotated image could not be published remotely (local copy at {0})")]
    Unreachable(String),
    #[error("Post-processing was interrupted: {0}")]
    Interrupted(Interrupted),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Source image is empty")]
    EmptyImage,
    #[error("No outfit recommendations were provided")]
    NoRecommendations,
    #[error("Image is too large ({size} bytes, limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
