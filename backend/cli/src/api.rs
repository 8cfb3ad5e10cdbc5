use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::{error, info, warn};

use conductor_agent::{AgentInvoker, InvokeOptions};
use conductor_core::ConductorError;
use conductor_session::{time, validate_session_id};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub invoker: AgentInvoker,
    pub plans_dir: PathBuf,
}

/// Build the Axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/log", get(get_log))
        .route("/api/sessions/:id/transcript", get(get_transcript))
        .route("/api/reports/:id", get(get_reports))
        .route("/api/plans", get(list_plans))
        .route("/api/orchestrate", post(orchestrate))
        .with_state(state)
}

/// JSON `{"error": ...}` with a status picked from the error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

fn status_for(err: &ConductorError) -> StatusCode {
    match err {
        ConductorError::SessionNotFound(_) | ConductorError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        ConductorError::SessionBusy(_) => StatusCode::CONFLICT,
        ConductorError::InvalidSessionId(_)
        | ConductorError::InvalidPath(_)
        | ConductorError::UnknownTool(_)
        | ConductorError::ConfigError(_) => StatusCode::BAD_REQUEST,
        ConductorError::Other(inner) => inner
            .downcast_ref::<ConductorError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ConductorError> for ApiError {
    fn from(err: ConductorError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = err
            .downcast_ref::<ConductorError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(error = %self.message, "API request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "conductor",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let store = state.invoker.store();
    let sessions: Vec<Value> = store
        .list_sessions()
        .await?
        .into_iter()
        .map(|metadata| {
            let running = store.is_busy(&metadata.session_id);
            let mut value = serde_json::to_value(&metadata).unwrap_or(Value::Null);
            if let Some(obj) = value.as_object_mut() {
                obj.insert("running".into(), json!(running));
            }
            value
        })
        .collect();
    Ok(Json(json!({ "sessions": sessions })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let invoker = &state.invoker;
    let metadata = invoker.store().load_session(&id).await?;
    let records = invoker.transcript().read_records(&id).await?;
    let summaries = invoker.summaries().read_summaries(&id).await?;
    Ok(Json(json!({
        "metadata": metadata,
        "recordCount": records.len(),
        "running": invoker.store().is_busy(&id),
        "summaries": summaries,
    })))
}

async fn get_log(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<String> {
    Ok(state.invoker.stream().read_log(&id).await?)
}

async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.invoker.store().load_session(&id).await?;
    let records = state.invoker.transcript().read_records(&id).await?;
    Ok(Json(json!({ "sessionId": id, "records": records })))
}

async fn get_reports(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_session_id(&id)?;
    let summaries = state.invoker.summaries().read_summaries(&id).await?;
    if summaries.is_empty() {
        // Distinguish "no reports yet" from "no such session".
        state.invoker.store().load_session(&id).await?;
    }
    Ok(Json(json!({ "sessionId": id, "summaries": summaries })))
}

async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut plans = Vec::new();
    let mut entries = match fs::read_dir(&state.plans_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(json!({ "plans": plans })));
        }
        Err(e) => return Err(anyhow::Error::new(e).into()),
    };

    while let Some(entry) = entries.next_entry().await.map_err(anyhow::Error::new)? {
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable plan");
                continue;
            }
        };
        let modified = meta
            .modified()
            .ok()
            .map(|t| time::iso_millis(&chrono::DateTime::<chrono::Utc>::from(t)));
        plans.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "size": meta.len(),
            "modified": modified,
        }));
    }
    plans.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(Json(json!({ "plans": plans })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateRequest {
    pub agent: Option<String>,
    pub prompt: String,
    pub timeout_secs: Option<u64>,
    pub continue_session_id: Option<String>,
}

/// Start an invocation and return its session id while it runs.
async fn orchestrate(
    State(state): State<AppState>,
    payload: Result<Json<OrchestrateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let options = InvokeOptions {
        agent_name: request.agent,
        timeout: request.timeout_secs.map(Duration::from_secs),
        stream_to_file: true,
        continue_session_id: request.continue_session_id,
    };
    let invocation = state.invoker.start(request.prompt, options).await?;
    let session_id = invocation.session_id().to_string();
    let agent_name = invocation.agent_name().to_string();
    let continuation = invocation.is_continuation();

    tokio::spawn(async move {
        match invocation.run().await {
            Ok(outcome) => info!(
                session_id = %outcome.session_id,
                status = %outcome.status,
                "Orchestrated invocation finished"
            ),
            Err(e) => error!(error = %format!("{e:#}"), "Orchestrated invocation failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "sessionId": session_id,
            "agentName": agent_name,
            "continuation": continuation,
        })),
    ))
}
