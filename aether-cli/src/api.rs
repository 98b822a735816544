//! HTTP API: probes, PLY export, and the reconstruction socket route.

use std::sync::Arc;

use aether_core::{
    ComputeGateway, PlyError, PlyFormat, Point, RawPoint, SessionConfig, SessionManager,
    SessionState, ply,
};
use axum::{
    Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::handlers::websocket::websocket_handler;

/// Filename offered to clients for exported clouds.
pub const EXPORT_FILENAME: &str = "pointcloud.ply";

/// Shared application state
#[derive(Clone)]
pub struct ApiState {
    /// Process-wide reconstruction resource
    pub gateway: Arc<ComputeGateway>,
    /// Registry of live socket sessions
    pub sessions: Arc<SessionManager>,
    /// Limits applied to every new session
    pub session_config: SessionConfig,
}

impl ApiState {
    /// Create API state around an already constructed gateway
    #[must_use]
    pub fn new(gateway: Arc<ComputeGateway>, session_config: SessionConfig) -> Self {
        Self {
            gateway,
            sessions: Arc::new(SessionManager::new()),
            session_config,
        }
    }
}

/// Service banner
pub async fn root(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "AetherScan Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "gpu_available": state.gateway.accelerator().is_accelerated(),
    }))
}

/// Liveness plus accelerator and compute status
pub async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let accelerator = state.gateway.accelerator();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "gpu": {
            "available": accelerator.is_accelerated(),
            "kind": accelerator.kind(),
        },
        "backend": state.gateway.backend_name(),
        "compute_ready": state.gateway.is_ready(),
        "active_sessions": state.sessions.session_count(),
        "reconstructing_sessions": state.sessions.count_in_state(SessionState::Reconstructing),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe: 200 once the compute gateway is initialized, 503 before.
pub async fn ready(State(state): State<ApiState>) -> Response {
    if state.gateway.is_ready() {
        (
            StatusCode::OK,
            Json(json!({"ready": true, "status": "ready"})),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false, "status": "initializing"})),
        )
            .into_response()
    }
}

/// Query parameters for `POST /export/ply`
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// `ascii` (default) or `binary`
    pub format: Option<String>,
}

/// Export a client-supplied point sequence as a PLY attachment.
///
/// ASCII exports are wrapped as `{"ply": "<document>"}`; binary exports are
/// returned as raw bytes.
pub async fn export_ply(
    Query(query): Query<ExportQuery>,
    body: Result<Json<Vec<RawPoint>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(raw) = body.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let format = match query.format.as_deref() {
        None | Some("ascii") => PlyFormat::Ascii,
        Some("binary") => PlyFormat::BinaryLittleEndian,
        Some(other) => {
            return Err(ApiError::InvalidInput(format!(
                "Unknown export format '{other}', expected 'ascii' or 'binary'"
            )));
        }
    };

    let points: Vec<Point> = raw.iter().map(RawPoint::normalize).collect();
    let disposition = format!("attachment; filename={EXPORT_FILENAME}");

    let response = match format {
        PlyFormat::Ascii => {
            let document = ply::encode_ascii(&points).map_err(export_error)?;
            (
                [(header::CONTENT_DISPOSITION, disposition)],
                Json(json!({ "ply": document })),
            )
                .into_response()
        }
        PlyFormat::BinaryLittleEndian => {
            let document = ply::encode_binary(&points).map_err(export_error)?;
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                document,
            )
                .into_response()
        }
    };
    Ok(response)
}

fn export_error(e: PlyError) -> ApiError {
    match e {
        PlyError::EmptyInput => ApiError::InvalidInput(e.to_string()),
        other => {
            error!("PLY export error: {other}");
            ApiError::SystemError(other.to_string())
        }
    }
}

/// Error types for HTTP API operations
#[derive(Debug)]
pub enum ApiError {
    /// Invalid input parameters or data
    InvalidInput(String),
    /// Internal system error occurred
    SystemError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            Self::SystemError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            })),
        )
            .into_response()
    }
}

/// Create the API router
pub fn create_api_routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/export/ply", post(export_ply))
        .route("/ws/reconstruct", get(websocket_handler))
}

/// Router with state attached, ready to serve.
pub fn create_app(state: ApiState) -> Router {
    create_api_routes().with_state(state)
}
