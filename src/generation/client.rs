use std::time::Instant;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::generation::job::{GenerationJob, JobStatus, OutfitItem, PollAttempt, SuccessFlag};
use crate::generation::prompt::{build_outfit_prompt, clothing_list};
use crate::media::HostedImage;
use crate::utils::cancel::RunContext;
use crate::utils::http::{get_http_client, truncate_for_log};

const API_SUCCESS_CODE: i64 = 200;
const API_NOT_FOUND_CODE: i64 = 404;
// The service spells its image-to-image mode this way.
const IMAGE_TO_IMAGE_MODE: &str = "IMAGETOIAMGE";
const ASPECT_RATIO: &str = "4:3";
const ERROR_BODY_LIMIT: usize = 600;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    #[serde(rename = "type")]
    mode: &'a str,
    #[serde(rename = "imageUrls")]
    image_urls: Vec<&'a str>,
    #[serde(rename = "numImages")]
    num_images: u32,
    image_size: &'a str,
    #[serde(rename = "callBackUrl")]
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitData {
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordInfoResponse {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<RecordInfoData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfoData {
    success_flag: Option<i64>,
    error_message: Option<String>,
    response: Option<RecordInfoResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfoResult {
    result_image_url: Option<String>,
    origin_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingReason {
    /// Request-level timeout or connection failure on one attempt.
    Transient(String),
    /// The task id is not visible to the status endpoint yet.
    NotVisible,
    Generating,
    UnknownFlag(Option<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Pending(PendingReason),
    Succeeded(String),
    Failed(GenerationError, Option<String>),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn interpret_status(payload: RecordInfoResponse) -> PollOutcome {
    match payload.code {
        Some(API_NOT_FOUND_CODE) => return PollOutcome::Pending(PendingReason::NotVisible),
        Some(code) if code != API_SUCCESS_CODE => {
            let message = non_empty(payload.msg).unwrap_or_else(|| "Unknown error".to_string());
            return PollOutcome::Failed(
                GenerationError::Api {
                    code,
                    message: message.clone(),
                },
                Some(message),
            );
        }
        _ => {}
    }

    let Some(data) = payload.data else {
        return PollOutcome::Pending(PendingReason::UnknownFlag(None));
    };
    let Some(flag) = data.success_flag.map(SuccessFlag::from_code) else {
        return PollOutcome::Pending(PendingReason::UnknownFlag(None));
    };

    match flag {
        SuccessFlag::Generating => PollOutcome::Pending(PendingReason::Generating),
        SuccessFlag::Succeeded => {
            let url = data.response.and_then(|response| {
                non_empty(response.result_image_url).or_else(|| non_empty(response.origin_image_url))
            });
            match url {
                Some(url) => PollOutcome::Succeeded(url),
                None => PollOutcome::Failed(GenerationError::MalformedSuccess, None),
            }
        }
        SuccessFlag::CreateTaskFailed | SuccessFlag::GenerationFailed => {
            let message = non_empty(data.error_message);
            PollOutcome::Failed(
                GenerationError::GenerationFailed {
                    flag: flag.code(),
                    message: message.clone().unwrap_or_else(|| flag.label().to_string()),
                },
                message,
            )
        }
        SuccessFlag::Unknown(code) => PollOutcome::Pending(PendingReason::UnknownFlag(Some(code))),
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Submits image-to-image outfit jobs and polls them to a terminal state.
#[derive(Debug, Clone)]
pub struct GenerationJobClient {
    config: GenerationConfig,
    client: Client,
}

impl GenerationJobClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self::with_client(config, get_http_client().clone())
    }

    pub fn with_client(config: GenerationConfig, client: Client) -> Self {
        GenerationJobClient { config, client }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Submits then polls. `Err` means no job was created; every created job
    /// comes back in a terminal state.
    pub async fn run(
        &self,
        source: &HostedImage,
        items: &[OutfitItem],
        style: &str,
        ctx: &RunContext,
    ) -> Result<GenerationJob, GenerationError> {
        let job = self.submit(source, items, style, ctx).await?;
        Ok(self.poll(job, ctx).await)
    }

    pub async fn submit(
        &self,
        source: &HostedImage,
        items: &[OutfitItem],
        style: &str,
        ctx: &RunContext,
    ) -> Result<GenerationJob, GenerationError> {
        if self.config.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }
        let Some(source_url) = source.remote_url() else {
            return Err(GenerationError::UnreachableSource(source.url().to_string()));
        };

        let prompt = build_outfit_prompt(items, style);
        let request = SubmitRequest {
            prompt: &prompt,
            mode: IMAGE_TO_IMAGE_MODE,
            image_urls: vec![source_url],
            num_images: 1,
            image_size: ASPECT_RATIO,
            callback_url: &self.config.callback_url,
        };
        info!(
            source_url = %source_url,
            style = %style,
            items = ?clothing_list(items),
            "Submitting outfit generation job"
        );

        let send = self
            .client
            .post(self.endpoint("generate"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.submit_timeout)
            .json(&request)
            .send();
        let response = ctx
            .guard(send)
            .await
            .map_err(GenerationError::Interrupted)?
            .map_err(|err| GenerationError::Submission(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = ctx
                .guard(response.text())
                .await
                .map_err(GenerationError::Interrupted)?
                .unwrap_or_default();
            return Err(GenerationError::Submission(format!(
                "HTTP {status}: {}",
                truncate_for_log(&body, ERROR_BODY_LIMIT)
            )));
        }

        let payload = ctx
            .guard(response.json::<SubmitResponse>())
            .await
            .map_err(GenerationError::Interrupted)?
            .map_err(|err| GenerationError::Submission(format!("unreadable response: {err}")))?;

        if payload.code != Some(API_SUCCESS_CODE) {
            let message = non_empty(payload.msg).unwrap_or_else(|| "Unknown error".to_string());
            return Err(GenerationError::Submission(format!(
                "API code {:?}: {message}",
                payload.code
            )));
        }

        let Some(task_id) = non_empty(payload.data.and_then(|data| data.task_id)) else {
            return Err(GenerationError::Submission(
                "response did not include a task id".to_string(),
            ));
        };

        info!(task_id = %task_id, "Generation job created");
        Ok(GenerationJob::new(task_id))
    }

    async fn fetch_status(&self, task_id: &str) -> (PollOutcome, Option<String>) {
        let response = match self
            .client
            .get(self.endpoint("record-info"))
            .query(&[("taskId", task_id)])
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.poll_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if is_transient(&err) => {
                return (
                    PollOutcome::Pending(PendingReason::Transient(err.to_string())),
                    None,
                );
            }
            Err(err) => {
                return (
                    PollOutcome::Failed(GenerationError::Transport(err.to_string()), None),
                    None,
                );
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return (
                    PollOutcome::Pending(PendingReason::Transient(err.to_string())),
                    None,
                );
            }
        };

        if status != StatusCode::OK {
            return (
                PollOutcome::Pending(PendingReason::Transient(format!("HTTP {status}"))),
                Some(body),
            );
        }

        match serde_json::from_str::<RecordInfoResponse>(&body) {
            Ok(payload) => (interpret_status(payload), Some(body)),
            Err(err) => (
                PollOutcome::Pending(PendingReason::Transient(format!(
                    "unreadable status body: {err}"
                ))),
                Some(body),
            ),
        }
    }

    /// Polls until the job reaches a terminal state or the attempt budget is
    /// spent. Each attempt waits one interval first.
    pub async fn poll(&self, mut job: GenerationJob, ctx: &RunContext) -> GenerationJob {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts;

        for index in 1..=max_attempts {
            if let Err(interrupted) = ctx.sleep(self.config.poll_interval).await {
                job.elapsed = started.elapsed();
                warn!(task_id = %job.id, attempt = index, "Polling interrupted: {interrupted}");
                job.fail(GenerationError::Interrupted(interrupted), None);
                return job;
            }

            let (outcome, raw) = match ctx.guard(self.fetch_status(&job.id)).await {
                Ok(result) => result,
                Err(interrupted) => {
                    job.elapsed = started.elapsed();
                    warn!(task_id = %job.id, attempt = index, "Polling interrupted: {interrupted}");
                    job.fail(GenerationError::Interrupted(interrupted), None);
                    return job;
                }
            };

            let attempt = PollAttempt {
                index,
                elapsed: started.elapsed(),
                raw,
            };
            job.attempts = attempt.index;
            job.elapsed = attempt.elapsed;
            self.record_attempt(&job, &attempt, &outcome);

            match outcome {
                PollOutcome::Pending(PendingReason::Generating) => {
                    job.status = JobStatus::Generating;
                }
                PollOutcome::Pending(_) => {}
                PollOutcome::Succeeded(url) => {
                    info!(
                        task_id = %job.id,
                        attempt = index,
                        elapsed_ms = job.elapsed.as_millis() as u64,
                        "Generation succeeded: {}",
                        truncate_for_log(&url, 80)
                    );
                    job.succeed(url);
                    return job;
                }
                PollOutcome::Failed(failure, message) => {
                    warn!(
                        task_id = %job.id,
                        attempt = index,
                        "Generation job failed: {failure}"
                    );
                    job.fail(failure, message);
                    return job;
                }
            }
        }

        warn!(
            task_id = %job.id,
            attempts = max_attempts,
            elapsed_ms = job.elapsed.as_millis() as u64,
            "Generation did not finish within the poll budget"
        );
        job.fail(
            GenerationError::PollTimeout {
                attempts: max_attempts,
            },
            None,
        );
        job
    }

    fn record_attempt(&self, job: &GenerationJob, attempt: &PollAttempt, outcome: &PollOutcome) {
        let interpreted = match outcome {
            PollOutcome::Pending(PendingReason::Generating) => "generating".to_string(),
            PollOutcome::Pending(PendingReason::NotVisible) => "not_visible".to_string(),
            PollOutcome::Pending(PendingReason::UnknownFlag(flag)) => format!("unknown({flag:?})"),
            PollOutcome::Pending(PendingReason::Transient(reason)) => {
                warn!(
                    task_id = %job.id,
                    attempt = attempt.index,
                    "Status check failed, retrying: {reason}"
                );
                "transient".to_string()
            }
            PollOutcome::Succeeded(_) => "succeeded".to_string(),
            PollOutcome::Failed(_, _) => "failed".to_string(),
        };
        debug!(
            task_id = %job.id,
            attempt = attempt.index,
            max_attempts = self.config.max_attempts,
            elapsed_ms = attempt.elapsed.as_millis() as u64,
            flag = %interpreted,
            raw = %attempt.raw.as_deref().map(|raw| truncate_for_log(raw, ERROR_BODY_LIMIT)).unwrap_or_default(),
            "Polled generation status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        closed_port_url, stalled_body_server, status_flag, status_not_found, status_success,
        FakeServices, Scripted,
    };
    use crate::utils::cancel::{CancelToken, Interrupted};
    use axum::http::StatusCode as HttpStatus;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn hosted() -> HostedImage {
        HostedImage::Hosted {
            url: "https://img.test/source.jpg".to_string(),
        }
    }

    fn items() -> Vec<OutfitItem> {
        vec![
            OutfitItem::new("Пальто", "чёрное, шерсть"),
            OutfitItem::new("Джинсы", "синие"),
        ]
    }

    fn parse(value: serde_json::Value) -> PollOutcome {
        interpret_status(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn interprets_status_payloads() {
        assert_eq!(
            parse(json!({ "code": 404, "msg": "not found" })),
            PollOutcome::Pending(PendingReason::NotVisible)
        );
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 0 } })),
            PollOutcome::Pending(PendingReason::Generating)
        );
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 5 } })),
            PollOutcome::Pending(PendingReason::UnknownFlag(Some(5)))
        );
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 1,
                "response": { "resultImageUrl": "", "originImageUrl": "https://o.test/x.png" } } })),
            PollOutcome::Succeeded("https://o.test/x.png".to_string())
        );
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 1, "response": {} } })),
            PollOutcome::Failed(GenerationError::MalformedSuccess, None)
        );
        assert_eq!(
            parse(json!({ "code": 500, "msg": "credits exhausted" })),
            PollOutcome::Failed(
                GenerationError::Api {
                    code: 500,
                    message: "credits exhausted".to_string()
                },
                Some("credits exhausted".to_string())
            )
        );
    }

    #[test]
    fn result_url_is_preferred_over_origin() {
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 1, "response": {
                "resultImageUrl": "https://r.test/a.png", "originImageUrl": "https://o.test/b.png" } } })),
            PollOutcome::Succeeded("https://r.test/a.png".to_string())
        );
    }

    #[test]
    fn failure_flags_capture_message() {
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 3, "errorMessage": "blocked" } })),
            PollOutcome::Failed(
                GenerationError::GenerationFailed {
                    flag: 3,
                    message: "blocked".to_string()
                },
                Some("blocked".to_string())
            )
        );
        assert_eq!(
            parse(json!({ "code": 200, "data": { "successFlag": 2 } })),
            PollOutcome::Failed(
                GenerationError::GenerationFailed {
                    flag: 2,
                    message: "CREATE_TASK_FAILED".to_string()
                },
                None
            )
        );
    }

    #[tokio::test]
    async fn submit_sends_service_contract() {
        let fake = FakeServices::start().await;
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .submit(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.id, "task-1");
        assert_eq!(job.status, JobStatus::Pending);
        let submitted = fake.submitted();
        assert_eq!(submitted.len(), 1);
        let body = &submitted[0];
        assert_eq!(body["type"], "IMAGETOIAMGE");
        assert_eq!(body["imageUrls"], json!(["https://img.test/source.jpg"]));
        assert_eq!(body["numImages"], 1);
        assert_eq!(body["image_size"], "4:3");
        assert_eq!(body["callBackUrl"], "https://callback.test/webhook");
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.contains("Пальто (чёрное, шерсть), Джинсы (синие)"));
        assert!(prompt.contains("Style: casual."));
    }

    #[tokio::test]
    async fn missing_task_id_fails_without_polling() {
        let fake = FakeServices::start().await;
        fake.script_submit(vec![Scripted::ok(
            json!({ "code": 200, "msg": "success", "data": {} }),
        )]);
        let client = GenerationJobClient::new(fake.generation_config());

        let result = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await;

        assert!(matches!(result, Err(GenerationError::Submission(_))));
        assert_eq!(fake.status_calls(), 0);
    }

    #[tokio::test]
    async fn non_success_submission_code_fails() {
        let fake = FakeServices::start().await;
        fake.script_submit(vec![Scripted::ok(
            json!({ "code": 402, "msg": "insufficient credits", "data": null }),
        )]);
        let client = GenerationJobClient::new(fake.generation_config());

        let err = client
            .submit(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient credits"));

        fake.script_submit(vec![Scripted::Json(
            HttpStatus::UNAUTHORIZED,
            json!({ "code": 401, "msg": "bad key" }),
        )]);
        let err = client
            .submit(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Submission(_)));
        assert_eq!(fake.status_calls(), 0);
    }

    #[tokio::test]
    async fn local_fallback_source_is_refused() {
        let fake = FakeServices::start().await;
        let client = GenerationJobClient::new(fake.generation_config());
        let source = HostedImage::LocalFallback {
            path: PathBuf::from("uploads/temp_1.jpg"),
            url: "http://localhost:8000/uploads/temp_1.jpg".to_string(),
        };

        let err = client
            .submit(&source, &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::UnreachableSource(_)));
        assert_eq!(fake.submit_calls(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_is_refused() {
        let fake = FakeServices::start().await;
        let mut config = fake.generation_config();
        config.api_key = " ".to_string();
        let client = GenerationJobClient::new(config);

        let err = client
            .submit(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::MissingApiKey);
        assert_eq!(fake.submit_calls(), 0);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![
            status_flag(0),
            status_flag(0),
            status_success("https://cdn.test/result.png"),
        ]);
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/result.png"));
        assert_eq!(job.attempts, 3);
        assert_eq!(fake.status_calls(), 3);
        assert_eq!(fake.polled_task_ids(), vec!["task-1"; 3]);
    }

    #[tokio::test]
    async fn times_out_after_exactly_max_attempts() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![status_flag(0)]);
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::TimedOut);
        assert_eq!(job.attempts, 90);
        assert_eq!(fake.status_calls(), 90);
        assert_eq!(
            job.into_result(),
            Err(GenerationError::PollTimeout { attempts: 90 })
        );
    }

    #[tokio::test]
    async fn not_found_responses_keep_polling() {
        let fake = FakeServices::start().await;
        let mut script: Vec<Scripted> = (0..5).map(|_| status_not_found()).collect();
        script.push(status_flag(0));
        script.push(status_success("https://cdn.test/late.png"));
        fake.script_status(script);
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 7);
        assert_eq!(job.into_result(), Ok("https://cdn.test/late.png".to_string()));
    }

    #[tokio::test]
    async fn failure_flag_stops_immediately() {
        for flag in [2, 3] {
            let fake = FakeServices::start().await;
            fake.script_status(vec![
                status_flag(0),
                Scripted::ok(json!({ "code": 200, "data": {
                    "successFlag": flag, "errorMessage": "content policy" } })),
                status_success("https://cdn.test/never.png"),
            ]);
            let client = GenerationJobClient::new(fake.generation_config());

            let job = client
                .run(&hosted(), &items(), "casual", &RunContext::unbounded())
                .await
                .unwrap();

            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error_message.as_deref(), Some("content policy"));
            assert_eq!(job.result_url, None);
            assert_eq!(fake.status_calls(), 2);
        }
    }

    #[tokio::test]
    async fn api_error_during_poll_is_terminal() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![
            Scripted::ok(json!({ "code": 500, "msg": "internal" })),
            status_success("https://cdn.test/never.png"),
        ]);
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(matches!(job.failure, Some(GenerationError::Api { code: 500, .. })));
        assert_eq!(fake.status_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_flags_and_http_errors_keep_polling() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![
            status_flag(9),
            Scripted::Json(HttpStatus::BAD_GATEWAY, json!({ "error": "upstream" })),
            Scripted::ok(json!({ "code": 200, "data": null })),
            status_success("https://cdn.test/ok.png"),
        ]);
        let client = GenerationJobClient::new(fake.generation_config());

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 4);
    }

    #[tokio::test]
    async fn slow_status_request_is_retried() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![
            Scripted::Delayed(
                Duration::from_millis(500),
                json!({ "code": 200, "data": { "successFlag": 0 } }),
            ),
            status_success("https://cdn.test/after-timeout.png"),
        ]);
        let mut config = fake.generation_config();
        config.poll_timeout = Duration::from_millis(100);
        let client = GenerationJobClient::new(config);

        let job = client
            .run(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn deadline_ends_polling_as_timed_out() {
        let fake = FakeServices::start().await;
        fake.script_status(vec![status_flag(0)]);
        let mut config = fake.generation_config();
        config.poll_interval = Duration::from_millis(20);
        let client = GenerationJobClient::new(config);
        let job = client
            .submit(&hosted(), &items(), "casual", &RunContext::unbounded())
            .await
            .unwrap();

        let ctx = RunContext::with_timeout(Duration::from_millis(70));
        let job = client.poll(job, &ctx).await;

        assert_eq!(job.status, JobStatus::TimedOut);
        assert_eq!(
            job.failure,
            Some(GenerationError::Interrupted(Interrupted::DeadlineExceeded))
        );
        assert!(fake.status_calls() < 90);
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_submitting() {
        let fake = FakeServices::start().await;
        let client = GenerationJobClient::new(fake.generation_config());
        let (handle, token) = CancelToken::new();
        handle.cancel();
        let ctx = RunContext::unbounded().with_cancel(token);

        let err = client
            .run(&hosted(), &items(), "casual", &ctx)
            .await
            .unwrap_err();

        assert_eq!(err, GenerationError::Interrupted(Interrupted::Cancelled));
        assert_eq!(fake.submit_calls(), 0);
    }

    #[tokio::test]
    async fn refused_connections_keep_polling_until_budget() {
        let fake = FakeServices::start().await;
        let mut config = fake.generation_config();
        config.base_url = closed_port_url();
        config.max_attempts = 3;
        let client = GenerationJobClient::new(config);

        let job = client
            .poll(GenerationJob::new("task-9"), &RunContext::unbounded())
            .await;

        assert_eq!(job.status, JobStatus::TimedOut);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.failure, Some(GenerationError::PollTimeout { attempts: 3 }));
    }

    #[tokio::test]
    async fn malformed_status_request_fails_the_job() {
        let fake = FakeServices::start().await;
        let mut config = fake.generation_config();
        config.base_url = "not a url".to_string();
        let client = GenerationJobClient::new(config);

        let job = client
            .poll(GenerationJob::new("task-9"), &RunContext::unbounded())
            .await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert!(matches!(job.failure, Some(GenerationError::Transport(_))));
    }

    #[tokio::test]
    async fn deadline_while_reading_rejection_body_is_an_interruption() {
        let fake = FakeServices::start().await;
        let mut config = fake.generation_config();
        config.base_url = stalled_body_server(502);
        config.submit_timeout = Duration::from_secs(30);
        let client = GenerationJobClient::new(config);

        let started = std::time::Instant::now();
        let err = client
            .submit(
                &hosted(),
                &items(),
                "casual",
                &RunContext::with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GenerationError::Interrupted(Interrupted::DeadlineExceeded)
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
