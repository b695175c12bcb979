//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/llama` | `{query}` | `{response}` |
//! | `POST` | `/documents` | multipart `file` (PDF) | `{status, file_name, doc_len, chunks}` |
//! | `POST` | `/ask_pdf` | `{query}` | `{answer, source}` |
//! | `POST` | `/create_embeddings` | `{url}` | `{message}` |
//! | `POST` | `/rag` | `{question, session_id?}` | `{rag_answer}` |
//! | `POST` | `/ollama` | `{prompt, session_id?}` | `{result}` |
//! | `POST` | `/text_to_embedding` | `{file_path}` | `{message}` |
//! | `POST` | `/upload_and_embed` | multipart `file` (text) | `{message}` |
//! | `GET`  | `/health` | | `{status: "healthy"}` |
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "Failed to create embeddings: unsupported URL scheme 'ftp'", "code": "bad_request" }
//! ```
//!
//! `bad_request` (400), `not_found` (404), `upstream` (500), `internal` (500).
//! The three embedding endpoints report every failure except a missing
//! local file as `bad_request`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::answer::AnswerService;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::ServiceError;
use crate::index::SqliteIndex;
use crate::ingest::Ingestor;
use crate::llm::create_model;
use crate::memory::DEFAULT_SESSION;
use crate::pool::CallGate;
use crate::retriever::Retriever;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub answers: Arc<AnswerService>,
}

impl AppState {
    pub fn new(ingestor: Ingestor, answers: AnswerService) -> Self {
        Self {
            ingestor: Arc::new(ingestor),
            answers: Arc::new(answers),
        }
    }

    /// Wire the SQLite index, embedder and model named by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = Arc::new(SqliteIndex::open(&config.index.path).await?);
        let embedder = create_embedder(&config.embedding)?;
        let model = create_model(&config.llm)?;
        let gate = CallGate::new(config.server.max_concurrent_calls);

        let ingestor = Ingestor::new(config, index.clone(), embedder.clone(), gate.clone())?;
        let retriever = Retriever::new(index, embedder, gate.clone());
        let answers = AnswerService::new(config, retriever, model, gate);
        Ok(Self::new(ingestor, answers))
    }
}

/// All routes with CORS, request tracing, panic recovery and the upload
/// size limit applied.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/llama", post(handle_llama))
        .route("/documents", post(handle_documents))
        .route("/ask_pdf", post(handle_ask_pdf))
        .route("/create_embeddings", post(handle_create_embeddings))
        .route("/rag", post(handle_rag))
        .route("/ollama", post(handle_ollama))
        .route("/text_to_embedding", post(handle_text_to_embedding))
        .route("/upload_and_embed", post(handle_upload_and_embed))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("docent listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl AppError {
    fn prefixed(mut self, prefix: &str) -> Self {
        self.detail = format!("{}: {}", prefix, self.detail);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = match &err {
            ServiceError::Upstream(e) => format!("{:#}", e),
            other => other.to_string(),
        };
        AppError {
            status,
            code: err.code(),
            detail,
        }
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        detail: detail.into(),
    }
}

/// Unwrap a JSON body, turning malformed JSON and missing fields into 400s.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Request handler panicked: {}", detail);
    AppError::from(ServiceError::Internal("internal server error".to_string())).into_response()
}

/// A file part pulled from a multipart body.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

/// Read the multipart field named `file`.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Upload, AppError> {
    let mut multipart = multipart.map_err(|rejection| bad_request(rejection.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("upload")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(bad_request("No file provided"))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

// ============ POST /llama ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
struct LlamaResponse {
    response: String,
}

/// Raw completion: the query goes to the model without a template.
async fn handle_llama(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<LlamaResponse>, AppError> {
    let req = json_body(payload)?;
    let response = state.answers.complete(&req.query).await?;
    Ok(Json(LlamaResponse { response }))
}

// ============ POST /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    status: &'static str,
    file_name: String,
    /// Number of pages loaded from the PDF.
    doc_len: usize,
    chunks: usize,
}

async fn handle_documents(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    let report = state
        .ingestor
        .ingest_pdf(&upload.file_name, upload.bytes)
        .await?;
    Ok(Json(DocumentsResponse {
        status: "Successfully Uploaded",
        file_name: upload.file_name,
        doc_len: report.documents,
        chunks: report.chunks,
    }))
}

// ============ POST /ask_pdf ============

#[derive(Serialize)]
struct AskPdfResponse {
    answer: String,
    /// `"document"` or `"general_knowledge"`.
    source: &'static str,
}

async fn handle_ask_pdf(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AskPdfResponse>, AppError> {
    let req = json_body(payload)?;
    let answer = state.answers.answer(&req.query).await?;
    Ok(Json(AskPdfResponse {
        answer: answer.text,
        source: answer.provenance.as_str(),
    }))
}

// ============ POST /create_embeddings ============

#[derive(Deserialize)]
struct UrlRequest {
    url: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_create_embeddings(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = json_body(payload)?;
    state
        .ingestor
        .ingest_url(&req.url)
        .await
        .map_err(|e| e.into_input_error("Failed to create embeddings"))?;
    Ok(Json(MessageResponse {
        message: "Embeddings created successfully from the provided URL.".to_string(),
    }))
}

// ============ POST /rag ============

#[derive(Deserialize)]
struct RagRequest {
    question: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct RagResponse {
    rag_answer: String,
}

async fn handle_rag(
    State(state): State<AppState>,
    payload: Result<Json<RagRequest>, JsonRejection>,
) -> Result<Json<RagResponse>, AppError> {
    let req = json_body(payload)?;
    let session = req.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    let rag_answer = state
        .answers
        .rag(&req.question, session)
        .await
        .map_err(|e| AppError::from(e).prefixed("RAG processing failed"))?;
    Ok(Json(RagResponse { rag_answer }))
}

// ============ POST /ollama ============

#[derive(Deserialize)]
struct OllamaRequest {
    prompt: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct OllamaResponse {
    result: String,
}

async fn handle_ollama(
    State(state): State<AppState>,
    payload: Result<Json<OllamaRequest>, JsonRejection>,
) -> Result<Json<OllamaResponse>, AppError> {
    let req = json_body(payload)?;
    let session = req.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    let result = state
        .answers
        .converse(&req.prompt, session)
        .await
        .map_err(|e| AppError::from(e).prefixed("Ollama processing failed"))?;
    Ok(Json(OllamaResponse { result }))
}

// ============ POST /text_to_embedding ============

#[derive(Deserialize)]
struct TextPathRequest {
    file_path: String,
}

async fn handle_text_to_embedding(
    State(state): State<AppState>,
    payload: Result<Json<TextPathRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = json_body(payload)?;
    state
        .ingestor
        .ingest_text_file(&PathBuf::from(&req.file_path))
        .await
        .map_err(|e| e.into_input_error("Failed to process text file"))?;
    Ok(Json(MessageResponse {
        message: format!(
            "Text file at {} has been successfully embedded.",
            req.file_path
        ),
    }))
}

// ============ POST /upload_and_embed ============

async fn handle_upload_and_embed(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    state
        .ingestor
        .ingest_text_upload(&upload.file_name, upload.bytes)
        .await
        .map_err(|e| e.into_input_error("Failed to process uploaded file"))?;
    Ok(Json(MessageResponse {
        message: format!("File {} has been successfully embedded.", upload.file_name),
    }))
}
