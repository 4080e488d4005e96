//! HTTP surface.
//!
//! # Endpoints
//!
//! - `GET /` - liveness
//! - `POST /process` - multipart upload (`file`, optional `scale`, `height`,
//!   `floor_count`, `conf_threshold`) → job result
//! - `POST /chat` - `{message}` → `{reply, updatedParams}`
//! - `GET /status` - current status, configuration and recent log lines
//! - `GET /download/:filename` - generated model file
//!
//! Job outcomes are always HTTP 200; callers inspect the `status` field.

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::JobError;
use crate::interpreter::{ChatController, ChatReply};
use crate::orchestrator::{JobResult, Upload, WorkflowOrchestrator};
use crate::params::{ParamKey, ParamOverrides};
use crate::state_machine::JobStatus;

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: WorkflowOrchestrator,
    pub chat: ChatController,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/process", post(process_handler))
        .route("/chat", post(chat_handler))
        .route("/status", get(status_handler))
        .route("/download/:filename", get(download_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Floor plan to BIM backend is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn process_handler(State(state): State<AppState>, multipart: Multipart) -> Json<JobResult> {
    let (upload, overrides) = match read_process_form(multipart).await {
        Ok(form) => form,
        Err(message) => {
            tracing::warn!("rejected /process request: {message}");
            return Json(JobResult::Error { message });
        }
    };
    let result = state
        .orchestrator
        .submit(upload, &overrides)
        .await
        .unwrap_or_else(JobResult::from);
    Json(result)
}

async fn read_process_form(mut multipart: Multipart) -> Result<(Upload, ParamOverrides), String> {
    let mut upload = None;
    let mut overrides = ParamOverrides::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(|e| e.to_string())?;
            upload = Some(Upload {
                filename,
                bytes: bytes.to_vec(),
            });
            continue;
        }
        let Ok(key) = name.parse::<ParamKey>() else {
            tracing::debug!(field = %name, "ignoring unknown form field");
            continue;
        };
        let text = field.text().await.map_err(|e| e.to_string())?;
        if text.trim().is_empty() {
            continue;
        }
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|_| format!("{key} must be a number, got {text:?}"))?;
        overrides
            .set(key, value)
            .map_err(|e| JobError::InvalidOverride(e).to_string())?;
    }

    let upload = upload.ok_or_else(|| "missing `file` field".to_string())?;
    Ok((upload, overrides))
}

async fn chat_handler(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<ChatReply> {
    Json(state.chat.handle(&request.message).await)
}

async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.orchestrator.snapshot().await;
    let reason = match &snapshot.status {
        JobStatus::Paused(reason) => Some(reason.to_string()),
        _ => None,
    };
    let error = match &snapshot.status {
        JobStatus::Error(message) => Some(message.clone()),
        _ => None,
    };
    let logs: Vec<String> = snapshot.recent_logs.iter().map(|e| e.to_string()).collect();
    Json(json!({
        "status": snapshot.status,
        "reason": reason,
        "error": error,
        "config": snapshot.params.as_map(),
        "recentLogs": logs,
    }))
}

async fn download_handler(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    let not_found = || (StatusCode::NOT_FOUND, Json(json!({"error": "File not found"}))).into_response();
    if !is_served_name(&filename) {
        return not_found();
    }
    let path = state.orchestrator.output_dir().join(&filename);
    let is_file = tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file());
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) if is_file => file,
        _ => return not_found(),
    };
    (
        [
            (header::CONTENT_TYPE, "application/x-step".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Output names are `{uuid}.ifc`; anything outside `[A-Za-z0-9._-]`, or with
/// `..`, is refused before touching the filesystem.
fn is_served_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, Detection, DetectionReport, Detector, Element, ModelGenerator};
    use crate::interpreter::RuleInterpreter;
    use crate::orchestrator::OrchestratorSettings;
    use crate::params::PipelineParams;
    use async_trait::async_trait;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct OneColumn;

    #[async_trait]
    impl Detector for OneColumn {
        async fn detect(&self, _source: &std::path::Path, _threshold: f64) -> Result<DetectionReport, CollaboratorError> {
            Ok(DetectionReport::new(vec![Detection {
                class: "column".into(),
                confidence: 0.8,
                bbox: [100.0, 100.0, 200.0, 200.0],
            }]))
        }
    }

    struct FileWriter;

    #[async_trait]
    impl ModelGenerator for FileWriter {
        async fn generate(&self, _project: &str, elements: &[Element], output: &std::path::Path) -> Result<(), CollaboratorError> {
            tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
            tokio::fs::write(output, format!("elements={}", elements.len())).await.unwrap();
            Ok(())
        }
    }

    fn app(dir: &TempDir) -> (Router, WorkflowOrchestrator) {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(OneColumn),
            Arc::new(FileWriter),
            OrchestratorSettings {
                upload_dir: dir.path().join("uploads"),
                output_dir: dir.path().join("outputs"),
                collaborator_timeout: Duration::from_secs(5),
                retain_error_state: false,
            },
            PipelineParams::default(),
        );
        let chat = ChatController::new(orchestrator.clone(), Arc::new(RuleInterpreter::new()));
        (
            router(AppState {
                orchestrator: orchestrator.clone(),
                chat,
            }),
            orchestrator,
        )
    }

    fn multipart(fields: &[(&str, &str)], file: Option<&[u8]>) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        if let Some(bytes) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"plan.png\"\r\n\
                     Content-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Request::post("/process")
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn liveness() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app.oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["message"].as_str().unwrap().contains("running"));
    }

    #[tokio::test]
    async fn process_then_download() {
        let dir = TempDir::new().unwrap();
        let (app, orchestrator) = app(&dir);

        let response = app
            .clone()
            .oneshot(multipart(&[("floor_count", "2")], Some(&b"fake png"[..])))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["detections"], 1);
        // The override was one-shot.
        assert_eq!(orchestrator.params().await.floor_count, 1);

        let url = body["ifcUrl"].as_str().unwrap().to_string();
        let response = app.oneshot(Request::get(&url).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"elements=2");
    }

    #[tokio::test]
    async fn invalid_override_returns_error_payload() {
        let dir = TempDir::new().unwrap();
        let (app, orchestrator) = app(&dir);
        let response = app
            .oneshot(multipart(&[("conf_threshold", "2")], Some(&b"x"[..])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("conf_threshold"));
        assert!(orchestrator.context().await.is_none());
    }

    #[tokio::test]
    async fn missing_file_returns_error_payload() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let body = json_body(app.oneshot(multipart(&[("scale", "0.1")], None)).await.unwrap()).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "missing `file` field");
    }

    #[tokio::test]
    async fn chat_updates_params() {
        let dir = TempDir::new().unwrap();
        let (app, orchestrator) = app(&dir);
        let request = Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "set floors to 5"}"#))
            .unwrap();
        let body = json_body(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["updatedParams"]["floor_count"], 5);
        assert_eq!(orchestrator.params().await.floor_count, 5);
    }

    #[tokio::test]
    async fn status_reports_config_and_logs() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let body = json_body(app.oneshot(Request::get("/status").body(Body::empty()).unwrap()).await.unwrap()).await;
        assert_eq!(body["status"], "idle");
        assert_eq!(body["config"]["conf_threshold"], 0.25);
        assert!(body["recentLogs"][0].as_str().unwrap().ends_with("System initialized."));
    }

    #[test]
    fn served_names_are_plain() {
        assert!(is_served_name("0b6f1c2e-9a1d-4c1e-8d7b-3f2a1e0c9b8a.ifc"));
        for name in ["", "..", "a/b.ifc", "a\\b.ifc", "x\"y.ifc", "a b.ifc", "a\r\n.ifc"] {
            assert!(!is_served_name(name), "{name:?}");
        }
    }

    #[tokio::test]
    async fn download_streams_with_step_headers() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let outputs = dir.path().join("outputs");
        std::fs::create_dir_all(&outputs).unwrap();
        let payload = "ISO-10303-21;\n".repeat(10_000);
        std::fs::write(outputs.join("job.ifc"), &payload).unwrap();

        let response = app
            .oneshot(Request::get("/download/job.ifc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-step");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"job.ifc\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.len(), payload.len());
    }

    #[tokio::test]
    async fn download_rejects_traversal_and_missing() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        std::fs::create_dir_all(dir.path().join("outputs").join("sub")).unwrap();
        for url in [
            "/download/..%2Fsecret",
            "/download/nope.ifc",
            "/download/a%22b.ifc",
            "/download/sub",
        ] {
            let response = app
                .clone()
                .oneshot(Request::get(url).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{url}");
            assert_eq!(json_body(response).await["error"], "File not found");
        }
    }
}
