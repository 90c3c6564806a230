//! HTTP surface of the chatbot API.


use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::graph::ChatGraph;
use crate::index::service::IndexService;
use crate::pipeline::IngestionPipeline;
use crate::{RagError, Result};

/// Browser origins allowed to call the API with credentials.
const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Uploads can be whole medical references; the 2 MB extractor default is too small.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared handles behind every request handler.
#[derive(Clone)]
pub struct AppState {
    service: Arc<IndexService>,
    ingestion: Arc<IngestionPipeline>,
    graph: Arc<ChatGraph>,
    uploads_dir: PathBuf,
}

impl AppState {
    #[inline]
    pub fn new(
        service: Arc<IndexService>,
        ingestion: IngestionPipeline,
        graph: ChatGraph,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            ingestion: Arc::new(ingestion),
            graph: Arc::new(graph),
            uploads_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    question: String,
}

/// JSON error response in the `{"detail": {...}}` envelope.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    fn new(status: StatusCode, detail: Value) -> Self {
        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Build the application router with all routes and middleware attached.
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/Upload_File", post(upload))
        .route("/chat", post(chat))
        .layer(middleware::from_fn(cors))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind `addr` and serve requests until the process is stopped.
#[inline]
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    info!("Listening on http://{}", local_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "AI Heart Disease Chatbot API",
        "version": "1.0.0",
        "status": "running",
        "index_loaded": state.service.is_loaded().await,
        "endpoints": [
            {"path": "/health", "method": "GET", "description": "Check API and index status"},
            {"path": "/Upload_File", "method": "POST", "description": "Upload a document for RAG processing"},
            {"path": "/chat", "method": "POST", "description": "Send a question and get AI response"},
        ],
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let index_loaded = state.service.is_loaded().await;
    let message = if index_loaded {
        "Ready to chat"
    } else {
        "Please upload a document first"
    };

    Json(json!({
        "status": "healthy",
        "index_loaded": index_loaded,
        "index_path_exists": state.service.index_path().exists(),
        "message": message,
    }))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<Value>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        if field.name() != Some("file") {
            continue;
        }
        return process_upload(&state, field).await.map(Json);
    }

    Err(ApiError::new(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "Invalid upload",
            "message": "Multipart field 'file' is required",
        }),
    ))
}

async fn process_upload(
    state: &AppState,
    field: Field<'_>,
) -> std::result::Result<Value, ApiError> {
    let Some(file_name) = field.file_name().and_then(sanitize_file_name) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({
                "error": "Invalid upload",
                "message": "Uploaded file must have a filename",
            }),
        ));
    };

    if !state.ingestion.can_ingest(Path::new(&file_name)) {
        return Err(invalid_file_type(&state.ingestion));
    }

    let data = field.bytes().await.map_err(invalid_upload)?;

    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|error| processing_failed(&RagError::from(error)))?;
    let stored_path = state.uploads_dir.join(&file_name);
    tokio::fs::write(&stored_path, &data)
        .await
        .map_err(|error| processing_failed(&RagError::from(error)))?;

    info!("Stored upload '{}' ({} bytes)", file_name, data.len());

    let summary = state.ingestion.ingest(&stored_path).await.map_err(|error| {
        warn!("Failed to process upload '{}': {}", file_name, error);
        match error {
            RagError::UnsupportedFormat(_) => invalid_file_type(&state.ingestion),
            other => processing_failed(&other),
        }
    })?;

    // Clients get the file name back, never the server-side path.
    Ok(json!({
        "filename": summary.document,
        "stored_path": file_name,
        "status": "Processed successfully",
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(entry): Json<UserEntry>,
) -> std::result::Result<Json<Value>, ApiError> {
    let answer = state.graph.answer(&entry.question).await.map_err(|error| {
        warn!("Chat request failed: {}", error);
        match &error {
            RagError::NoDocumentLoaded | RagError::IndexNotFound => ApiError::new(
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "No document loaded",
                    "message": error.to_string(),
                    "suggestion": "Please upload a document first using the /Upload_File endpoint",
                }),
            ),
            _ => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Chat failed",
                    "message": error.to_string(),
                }),
            ),
        }
    })?;

    Ok(Json(json!({ "Assistant": answer })))
}

/// Echo CORS headers for the allowed frontend origins and answer preflights.
async fn cors(request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| ALLOWED_ORIGINS.contains(origin))
        .map(str::to_owned);

    let mut response = if request.method() == Method::OPTIONS {
        let requested_headers = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("content-type"));

        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested_headers);
        response
    } else {
        next.run(request).await
    };

    if let Some(origin) = origin {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            let headers = response.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    // The allow headers depend on the request origin, so caches must key on it.
    response
        .headers_mut()
        .insert(header::VARY, HeaderValue::from_static("Origin"));

    response
}

fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn invalid_upload(error: MultipartError) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "Invalid upload",
            "message": error.to_string(),
        }),
    )
}

fn invalid_file_type(ingestion: &IngestionPipeline) -> ApiError {
    let allowed = ingestion
        .supported_extensions()
        .iter()
        .map(|extension| format!(".{extension}"))
        .join(", ");

    ApiError::new(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "Invalid file type",
            "message": format!("Only {allowed} files are allowed"),
        }),
    )
}

fn processing_failed(error: &RagError) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "error": "Processing failed",
            "message": error.to_string(),
        }),
    )
}
