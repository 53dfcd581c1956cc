use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "outfit.timing";

#[derive(Debug)]
pub struct RequestTimer {
    operation: String,
    style: String,
    item_count: usize,
    image_bytes: usize,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn new(operation: &str, style: &str, item_count: usize, image_bytes: usize) -> Self {
        RequestTimer {
            operation: operation.to_string(),
            style: style.to_string(),
            item_count,
            image_bytes,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=request_received operation={} style={:?} items={} image_bytes={} received_at={}",
            self.operation,
            self.style,
            self.item_count,
            self.image_bytes,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed operation={} style={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.style,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_request_timer(
    operation: &str,
    style: &str,
    item_count: usize,
    image_bytes: usize,
) -> RequestTimer {
    let timer = RequestTimer::new(operation, style, item_count, image_bytes);
    timer.log_received();
    timer
}

pub fn complete_request_timer(timer: &mut RequestTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_stage_timing<T, E, F, Fut>(
    service: &str,
    stage: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=stage_started service={} stage={} started_at={} metadata={}",
        service,
        stage,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=stage_completed service={} stage={} completed_at={} duration_s={:.3} status={} metadata={}",
        service,
        stage,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
