//! In-process stand-ins for the generation service, the image host and the
//! result CDN, served by axum on an ephemeral local port.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

use crate::config::{GenerationConfig, ImageHostConfig, PostProcessConfig};

#[derive(Debug, Clone)]
pub enum Scripted {
    Json(StatusCode, Value),
    Delayed(Duration, Value),
}

impl Scripted {
    pub fn ok(value: Value) -> Self {
        Scripted::Json(StatusCode::OK, value)
    }
}

#[derive(Default)]
struct Script {
    queue: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl Script {
    // The last scripted response repeats once the queue drains to it.
    fn next(&self) -> Option<Scripted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[derive(Default)]
struct FakeState {
    submit: Script,
    status: Script,
    host: Script,
    image_calls: AtomicUsize,
    submitted: Mutex<Vec<Value>>,
    polled_task_ids: Mutex<Vec<String>>,
    hosted: Mutex<Vec<Vec<u8>>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
}

pub struct FakeServices {
    pub base_url: String,
    state: Arc<FakeState>,
}

async fn respond(scripted: Option<Scripted>, fallback: Value) -> Response {
    match scripted {
        Some(Scripted::Json(status, body)) => (status, Json(body)).into_response(),
        Some(Scripted::Delayed(delay, body)) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
        None => Json(fallback).into_response(),
    }
}

async fn generate_handler(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.submitted.lock().unwrap().push(body);
    let scripted = state.submit.next();
    respond(scripted, json!({ "code": 200, "msg": "success", "data": { "taskId": "task-1" } })).await
}

async fn record_info_handler(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(task_id) = query.get("taskId") {
        state.polled_task_ids.lock().unwrap().push(task_id.clone());
    }
    let scripted = state.status.next();
    respond(scripted, json!({ "code": 200, "msg": "success", "data": { "successFlag": 0 } })).await
}

async fn upload_handler(
    State(state): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let index = {
        let mut hosted = state.hosted.lock().unwrap();
        let decoded = form
            .get("image")
            .and_then(|data| general_purpose::STANDARD.decode(data).ok())
            .unwrap_or_default();
        hosted.push(decoded);
        hosted.len()
    };
    let scripted = state.host.next();
    respond(
        scripted,
        json!({ "success": true, "data": { "link": format!("http://img.test/hosted/{index}.jpg") } }),
    )
    .await
}

async fn image_handler(State(state): State<Arc<FakeState>>, Path(name): Path<String>) -> Response {
    state.image_calls.fetch_add(1, Ordering::SeqCst);
    match state.images.lock().unwrap().get(&name) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl FakeServices {
    pub async fn start() -> FakeServices {
        let state = Arc::new(FakeState::default());
        let router = Router::new()
            .route("/generate", post(generate_handler))
            .route("/record-info", get(record_info_handler))
            .route("/upload", post(upload_handler))
            .route("/images/{name}", get(image_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        FakeServices {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn script_submit(&self, responses: Vec<Scripted>) {
        *self.state.submit.queue.lock().unwrap() = responses.into();
    }

    pub fn script_status(&self, responses: Vec<Scripted>) {
        *self.state.status.queue.lock().unwrap() = responses.into();
    }

    pub fn script_host(&self, responses: Vec<Scripted>) {
        *self.state.host.queue.lock().unwrap() = responses.into();
    }

    pub fn serve_image(&self, name: &str, bytes: Vec<u8>) -> String {
        self.state
            .images
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes);
        self.image_url(name)
    }

    pub fn image_url(&self, name: &str) -> String {
        format!("{}/images/{name}", self.base_url)
    }

    pub fn submit_calls(&self) -> usize {
        self.state.submit.calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.state.status.calls.load(Ordering::SeqCst)
    }

    pub fn host_calls(&self) -> usize {
        self.state.host.calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.state.image_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<Value> {
        self.state.submitted.lock().unwrap().clone()
    }

    pub fn polled_task_ids(&self) -> Vec<String> {
        self.state.polled_task_ids.lock().unwrap().clone()
    }

    pub fn hosted(&self) -> Vec<Vec<u8>> {
        self.state.hosted.lock().unwrap().clone()
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            api_key: "test-key".to_string(),
            base_url: self.base_url.clone(),
            callback_url: "https://callback.test/webhook".to_string(),
            poll_interval: Duration::from_millis(1),
            max_attempts: 90,
            submit_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(5),
        }
    }

    pub fn image_host_config(&self, uploads_dir: PathBuf) -> ImageHostConfig {
        ImageHostConfig {
            endpoint: format!("{}/upload", self.base_url),
            client_id: "test-client".to_string(),
            timeout: Duration::from_secs(5),
            uploads_dir,
            public_base_url: "http://localhost:8000".to_string(),
        }
    }

    pub fn post_process_config(&self) -> PostProcessConfig {
        PostProcessConfig {
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

pub fn status_flag(flag: i64) -> Scripted {
    Scripted::ok(json!({ "code": 200, "msg": "success", "data": { "successFlag": flag } }))
}

pub fn status_success(result_url: &str) -> Scripted {
    Scripted::ok(json!({
        "code": 200,
        "msg": "success",
        "data": {
            "successFlag": 1,
            "errorMessage": "",
            "response": { "resultImageUrl": result_url }
        }
    }))
}

pub fn status_not_found() -> Scripted {
    Scripted::ok(json!({ "code": 404, "msg": "task not found", "data": null }))
}

/// A per-test directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "outfit-render-{}-{}-{}",
        name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Accepts one connection, answers with `status` and a body that never
/// arrives, then holds the socket open.
pub fn stalled_body_server(status: u16) -> String {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(read) => request.extend_from_slice(&buf[..read]),
            }
        }
        let head = format!("HTTP/1.1 {status} Stalled\r\nContent-Length: 64\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.flush();
        std::thread::sleep(Duration::from_secs(60));
    });
    format!("http://{addr}/stalled")
}

/// An address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
