use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::AppState;
use super::middleware::request_logger;
use super::reply::{ApiError, session_error};
use crate::cancel::Turn;
use crate::error::ToolError;
use crate::filetree::{self, FileNode};
use crate::gate::Permit;
use crate::jobs::{self, Job};
use crate::tools::Toolset;
use crate::tools::interceptor::{ScanOptions, Severity, SpecFormat, parse_categories};
use crate::tools::jadx::{self, DecompileOptions};
use crate::tools::llm::{self, ChatMessage, ChatReply};
use crate::tools::ghidra;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Inputs JADX accepts.
const DECOMPILE_EXTENSIONS: &[&str] = &[".apk", ".dex", ".aar"];

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route(
            "/api/android-re/decompile",
            get(decompiler_status).post(decompile),
        )
        .route("/api/android-re/file", get(read_file))
        .route("/api/native/analyze", post(analyze_native))
        .route(
            "/api/interceptor/sessions",
            get(list_sessions).delete(delete_session),
        )
        .route("/api/interceptor/sessions/:id", get(show_session))
        .route("/api/interceptor/scan", post(scan))
        .route("/api/interceptor/openapi", post(openapi))
        .route("/api/beautify", post(beautify))
        .route("/api/explain", post(explain))
        .route("/api/chat", post(chat))
        .layer(axum::middleware::from_fn(request_logger))
        .with_state(state)
}

/// Run a blocking tool call once the gate admits it.
async fn run_tool<T, F>(state: &AppState, job: F) -> Result<T, ToolError>
where
    F: FnOnce(&Toolset) -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    let permit = state.gate.admit().await?;
    run_admitted(state, permit, job).await
}

async fn run_admitted<T, F>(state: &AppState, permit: Permit, job: F) -> Result<T, ToolError>
where
    F: FnOnce(&Toolset) -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    let tools = Arc::clone(&state.tools);
    permit.run(move || job(&tools)).await?
}

fn required(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

fn internal(context: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>) -> Json<crate::tools::ToolReport> {
    Json(state.tools.report())
}

// ---- JADX ----

/// 503 with the availability body when JADX is missing.
async fn decompiler_status(State(state): State<AppState>) -> Response {
    let availability = state.tools.jadx.availability();
    if !availability.available {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(availability)).into_response();
    }
    let version = run_tool(&state, |t| t.jadx.version())
        .await
        .unwrap_or_else(|e| {
            debug!("jadx version check failed: {e}");
            "unknown".to_owned()
        });
    Json(json!({ "available": true, "version": version })).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DecompileRequest {
    input_path: String,
    show_bad_code: bool,
    no_res: bool,
    deobf: bool,
    threads_count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecompileResponse {
    success: bool,
    job_id: String,
    output_path: String,
    file_tree: Vec<FileNode>,
    message: String,
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    allowed.iter().any(|ext| name.ends_with(ext))
}

async fn decompile(
    State(state): State<AppState>,
    body: Result<Json<DecompileRequest>, JsonRejection>,
) -> ApiResult<DecompileResponse> {
    let Json(req) = body?;
    state.tools.jadx.availability().into_result(jadx::TOOL_NAME)?;
    required(&req.input_path, "inputPath")?;

    let input = PathBuf::from(&req.input_path);
    if !has_extension(&input, DECOMPILE_EXTENSIONS) {
        return Err(ApiError::bad_request(format!(
            "Invalid file type. Supported: {}",
            DECOMPILE_EXTENSIONS.join(", ")
        )));
    }

    let job = Job::create(&state.output_root, "jadx")
        .map_err(|e| internal("Failed to create job directory", e))?;
    let opts = DecompileOptions {
        output_dir: job.dir.clone(),
        show_bad_code: req.show_bad_code,
        no_res: req.no_res,
        deobf: req.deobf,
        threads_count: req.threads_count,
        ..Default::default()
    };

    // The job rides with the call, so an abandoned request drops it (and
    // its directory) only after JADX has exited.
    let (job, message) = run_tool(&state, move |t| {
        let message = t.jadx.decompile(&input, &opts)?;
        Ok((job, message))
    })
    .await?;
    let file_tree = filetree::output_tree(&job.dir)
        .map_err(|e| internal("Failed to list decompiled output", e))?;

    info!(job_id = %job.id, files = file_tree.len(), "decompile finished");
    let output_path = job.dir.display().to_string();
    Ok(Json(DecompileResponse {
        success: true,
        output_path,
        job_id: job.keep(),
        file_tree,
        message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileQuery {
    job_id: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileResponse {
    path: String,
    content: String,
    size: usize,
}

async fn read_file(
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<FileResponse> {
    let Query(q) = query?;
    let job_id = q.job_id.unwrap_or_default();
    required(&job_id, "jobId")?;
    let path = q.path.unwrap_or_default();
    required(&path, "path")?;

    let content = jobs::read_job_file(&state.output_root, &job_id, &path)?;
    Ok(Json(FileResponse {
        size: content.len(),
        path,
        content,
    }))
}

// ---- Ghidra ----

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalyzeRequest {
    input_path: String,
    max_cpu: Option<u32>,
    export_decompiled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    job_id: String,
    output_path: String,
    message: String,
}

async fn analyze_native(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<AnalyzeResponse> {
    let Json(req) = body?;
    state.tools.ghidra.availability().into_result(ghidra::TOOL_NAME)?;
    required(&req.input_path, "inputPath")?;

    let job = Job::create(&state.output_root, "ghidra")
        .map_err(|e| internal("Failed to create job directory", e))?;
    let input = PathBuf::from(&req.input_path);
    let project_dir = job.dir.clone();
    let AnalyzeRequest {
        max_cpu,
        export_decompiled,
        ..
    } = req;

    let (job, message) = run_tool(&state, move |t| {
        let message = if export_decompiled {
            t.ghidra
                .export_decompiled_code(&input, &project_dir, None, max_cpu)?
        } else {
            t.ghidra.analyze_native_lib(&input, &project_dir, None, max_cpu)?
        };
        Ok((job, message))
    })
    .await?;

    info!(job_id = %job.id, "native analysis finished");
    Ok(Json(AnalyzeResponse {
        output_path: job.dir.display().to_string(),
        job_id: job.keep(),
        message,
    }))
}

// ---- Interceptor ----

async fn list_sessions(State(state): State<AppState>) -> ApiResult<Value> {
    let sessions = run_tool(&state, |t| t.interceptor.list_sessions()).await?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn show_session(
    State(state): State<AppState>,
    UrlPath(session_id): UrlPath<String>,
) -> ApiResult<Value> {
    let id = session_id.clone();
    let session = run_tool(&state, move |t| t.interceptor.show_session(&id))
        .await
        .map_err(|e| session_error(&session_id, e))?;
    Ok(Json(json!({ "session": session })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionRequest {
    session_id: String,
}

async fn delete_session(
    State(state): State<AppState>,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    required(&req.session_id, "sessionId")?;

    let id = req.session_id.clone();
    let result = run_tool(&state, move |t| t.interceptor.delete_session(&id))
        .await
        .map_err(|e| session_error(&req.session_id, e))?;
    info!(session_id = %req.session_id, "session deleted");
    Ok(Json(json!({ "deleted": req.session_id, "result": result })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScanRequest {
    session_id: String,
    severity: Option<String>,
    category: Option<String>,
}

async fn scan(
    State(state): State<AppState>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    required(&req.session_id, "sessionId")?;

    let opts = ScanOptions {
        severity: req
            .severity
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<Severity>)
            .transpose()?,
        categories: match req.category.as_deref().filter(|c| !c.is_empty()) {
            Some(list) => parse_categories(list)?,
            None => Vec::new(),
        },
    };

    let id = req.session_id.clone();
    let scan = run_tool(&state, move |t| t.interceptor.scan(&id, &opts))
        .await
        .map_err(|e| session_error(&req.session_id, e))?;
    Ok(Json(json!({ "sessionId": req.session_id, "scan": scan })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OpenApiRequest {
    session_id: String,
    format: Option<String>,
    include_examples: bool,
}

async fn openapi(
    State(state): State<AppState>,
    body: Result<Json<OpenApiRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    required(&req.session_id, "sessionId")?;
    let format = match req.format.as_deref().filter(|f| !f.is_empty()) {
        Some(f) => f.parse::<SpecFormat>()?,
        None => SpecFormat::default(),
    };

    let id = req.session_id.clone();
    let include_examples = req.include_examples;
    let spec = run_tool(&state, move |t| {
        t.interceptor.openapi(&id, format, include_examples)
    })
    .await
    .map_err(|e| session_error(&req.session_id, e))?;
    Ok(Json(json!({
        "sessionId": req.session_id,
        "format": format.as_str(),
        "spec": spec,
    })))
}

// ---- LLM ----

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CodeRequest {
    code: String,
}

async fn beautify(
    State(state): State<AppState>,
    body: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    llm::check_code(&req.code)?;
    debug!(code_len = req.code.len(), "beautify requested");
    let result = run_tool(&state, move |t| t.llm.beautify(&req.code)).await?;
    Ok(Json(json!({ "result": result })))
}

async fn explain(
    State(state): State<AppState>,
    body: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    llm::check_code(&req.code)?;
    debug!(code_len = req.code.len(), "explain requested");
    let explanation = run_tool(&state, move |t| t.llm.explain(&req.code)).await?;
    Ok(Json(json!({ "explanation": explanation })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    history: Vec<ChatMessage>,
    /// Turns sharing an id supersede each other. A turn without one stands
    /// alone.
    conversation_id: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatReply> {
    let Json(req) = body?;
    required(&req.message, "message")?;
    debug!(
        message_len = req.message.len(),
        history = req.history.len(),
        "chat turn"
    );

    // Only an admitted turn may supersede; a rejected one leaves the
    // conversation's current turn running.
    let reservation = state.gate.reserve()?;
    let turn = req
        .conversation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| state.chat.begin(id));
    let permit = reservation.start().await?;

    let reply = run_admitted(&state, permit, move |t| {
        let reply = t.llm.chat(&req.message, &req.history, turn.as_ref().map(Turn::token));
        drop(turn);
        reply
    })
    .await?;
    Ok(Json(reply))
}
