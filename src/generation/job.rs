use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutfitItem {
    pub name: String,
    pub description: String,
}

impl OutfitItem {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        OutfitItem {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Generating,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// The service's coarse `successFlag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessFlag {
    Generating,
    Succeeded,
    CreateTaskFailed,
    GenerationFailed,
    Unknown(i64),
}

impl SuccessFlag {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Generating,
            1 => Self::Succeeded,
            2 => Self::CreateTaskFailed,
            3 => Self::GenerationFailed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Generating => 0,
            Self::Succeeded => 1,
            Self::CreateTaskFailed => 2,
            Self::GenerationFailed => 3,
            Self::Unknown(code) => *code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Generating => "GENERATING",
            Self::Succeeded => "SUCCESS",
            Self::CreateTaskFailed => "CREATE_TASK_FAILED",
            Self::GenerationFailed => "GENERATION_FAILED",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// One remote generation task. Only the poll loop mutates it, and only until
/// `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub failure: Option<GenerationError>,
    pub attempts: usize,
    pub elapsed: Duration,
}

impl GenerationJob {
    pub fn new(id: impl Into<String>) -> Self {
        GenerationJob {
            id: id.into(),
            status: JobStatus::Pending,
            result_url: None,
            error_message: None,
            failure: None,
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn succeed(&mut self, url: String) {
        debug_assert!(!self.is_terminal());
        self.status = JobStatus::Succeeded;
        self.result_url = Some(url);
    }

    pub(crate) fn fail(&mut self, failure: GenerationError, message: Option<String>) {
        debug_assert!(!self.is_terminal());
        self.status = match failure {
            GenerationError::PollTimeout { .. } | GenerationError::Interrupted(_) => {
                JobStatus::TimedOut
            }
            _ => JobStatus::Failed,
        };
        self.error_message = message.or_else(|| Some(failure.to_string()));
        self.failure = Some(failure);
    }

    /// The result URL of a succeeded job, or the reason there is none.
    pub fn into_result(self) -> Result<String, GenerationError> {
        match (self.status, self.result_url) {
            (JobStatus::Succeeded, Some(url)) => Ok(url),
            (JobStatus::Succeeded, None) => Err(GenerationError::MalformedSuccess),
            _ => Err(self.failure.unwrap_or(GenerationError::PollTimeout {
                attempts: self.attempts,
            })),
        }
    }
}

/// What one poll attempt saw, for event emission only.
#[derive(Debug, Clone)]
pub struct PollAttempt {
    pub index: usize,
    pub elapsed: Duration,
    pub raw: Option<String>,
}
