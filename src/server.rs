//! HTTP API server.
//!
//! Exposes the pipeline over JSON for web front-ends and other services.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Health check with version |
//! | `GET` | `/schema` | Review document JSON Schema |
//! | `POST` | `/analyze` | Analyze text, a URL, or base64 images; optionally persist |
//! | `POST` | `/validate` | Validate a review document |
//! | `POST` | `/map` | Map a review document to an analytics row |
//!
//! # Error Responses
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "exactly one of text, url, images_base64 is required" } }
//! ```
//!
//! CORS is open (`*`) so browser front-ends can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use consumer_sense_core::coerce::CoercionError;
use consumer_sense_core::row::map_document_to_row;
use consumer_sense_core::schema::{schema_document, validate_review_doc, ValidationReport};
use consumer_sense_core::sink::PersistMode;
use consumer_sense_core::upstream::MalformedResponse;
use consumer_sense_core::AnalyticsRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::client::ImageInput;
use crate::config::Config;
use crate::pipeline::{AnalysisInput, Outcome, Pipeline, PersistRequest};
use crate::scrape::ScrapeError;
use crate::sinks::UnknownSink;

/// Upload method recorded on documents created through the API.
pub const API_UPLOAD_METHOD: &str = "api";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Start the server on `config.server.bind` with the configured client and
/// sinks. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "HTTP server listening");
    println!("csense server listening on http://{}", config.server.bind);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

/// The API router, for embedding or tests.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/schema", get(handle_schema))
        .route("/analyze", post(handle_analyze))
        .route("/validate", post(handle_validate))
        .route("/map", post(handle_map))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn classify_pipeline_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if err.downcast_ref::<MalformedResponse>().is_some() {
        AppError::new(StatusCode::BAD_GATEWAY, "malformed_response", message)
    } else if err.downcast_ref::<ScrapeError>().is_some() {
        AppError::new(StatusCode::BAD_GATEWAY, "scrape_failed", message)
    } else if err.downcast_ref::<UnknownSink>().is_some() {
        AppError::new(StatusCode::BAD_REQUEST, "unknown_sink", message)
    } else {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "analysis_error", message)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /schema ============

async fn handle_schema() -> Json<Value> {
    Json(schema_document())
}

// ============ POST /analyze ============

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    images_base64: Option<Vec<String>>,
    #[serde(default)]
    save: Vec<String>,
    #[serde(default)]
    remote: bool,
}

impl AnalyzeRequest {
    fn into_input(self) -> Result<(AnalysisInput, PersistRequest), AppError> {
        let request = PersistRequest::new(self.save, PersistMode::from_remote_flag(self.remote));
        let text = self.text.filter(|t| !t.trim().is_empty());
        let url = self.url.filter(|u| !u.trim().is_empty());
        let images = self.images_base64.filter(|i| !i.is_empty());

        let input = match (text, url, images) {
            (Some(text), None, None) => AnalysisInput::Text(text),
            (None, Some(url), None) => AnalysisInput::Url(url),
            (context, None, Some(encoded)) => {
                let images = encoded
                    .iter()
                    .enumerate()
                    .map(|(i, b64)| decode_image(i, b64))
                    .collect::<Result<Vec<_>, _>>()?;
                AnalysisInput::Images { images, context }
            }
            _ => {
                return Err(bad_request(
                    "exactly one of text, url, images_base64 is required (text may accompany images)",
                ))
            }
        };
        Ok((input, request))
    }
}

fn decode_image(index: usize, b64: &str) -> Result<ImageInput, AppError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| bad_request(format!("images_base64[{}]: invalid base64: {}", index, e)))?;
    ImageInput::from_bytes(bytes).map_err(|e| bad_request(format!("images_base64[{}]: {}", index, e)))
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Outcome>, AppError> {
    let (input, request) = req.into_input()?;
    let outcome = state
        .pipeline
        .run(&input, API_UPLOAD_METHOD, &request)
        .await
        .map_err(classify_pipeline_error)?;
    Ok(Json(outcome))
}

// ============ POST /validate ============

async fn handle_validate(Json(doc): Json<Value>) -> Json<ValidationReport> {
    Json(validate_review_doc(&doc))
}

// ============ POST /map ============

async fn handle_map(Json(doc): Json<Value>) -> Result<Json<AnalyticsRow>, AppError> {
    map_document_to_row(&doc)
        .map(Json)
        .map_err(|e: CoercionError| {
            AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "coercion_error", e.to_string())
        })
}
