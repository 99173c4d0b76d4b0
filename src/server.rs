//! HTTP routes
//!
//! - `POST /api/contar` multipart upload (field `image`) -> counts
//! - `GET /api/health` -> status and the models visible to the key

use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::CountError;
use crate::json_output::{CountResponse, ErrorResponse, HealthResponse};
use crate::service::CountingService;

/// Multipart field carrying the photo
pub const IMAGE_FIELD: &str = "image";

const NO_IMAGE_SENT: &str = "Nenhuma imagem enviada";
const NO_IMAGE_SELECTED: &str = "Nenhuma imagem selecionada";

#[derive(Clone)]
struct AppState {
    service: Arc<CountingService>,
}

/// Error half of every handler: a status code plus `{ok: false, error}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CountError> for ApiError {
    fn from(err: CountError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> CountError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CountError::TooLarge { limit }
    } else {
        CountError::Upload(err.body_text())
    }
}

/// Build the application router around a shared counting service
pub fn router(service: Arc<CountingService>) -> Router {
    let body_limit = service.config().max_upload_bytes;

    Router::new()
        .route("/api/contar", post(count_handler))
        .route("/api/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState { service })
}

/// Bind the configured address and serve until Ctrl-C
pub async fn serve(service: Arc<CountingService>) -> Result<()> {
    let addr = service.config().bind_addr()?;
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Abacus counter listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Pull the `image` file part out of the form
async fn read_image_field(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<(String, Vec<u8>), CountError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not a file
        let filename = match field.file_name() {
            None => return Err(CountError::Upload(NO_IMAGE_SENT.to_string())),
            Some(name) if name.is_empty() => {
                return Err(CountError::Upload(NO_IMAGE_SELECTED.to_string()))
            }
            Some(name) => name.to_string(),
        };

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(CountError::Upload(NO_IMAGE_SENT.to_string()))
}

async fn count_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CountResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!("Rejected upload: {}", rejection.body_text());
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: NO_IMAGE_SENT.to_string(),
        }
    })?;

    let limit = state.service.config().max_upload_bytes;
    let (filename, bytes) = read_image_field(&mut multipart, limit).await.map_err(|e| {
        warn!("Invalid upload: {}", e);
        ApiError::from(e)
    })?;

    let outcome = state.service.count(&filename, bytes).await?;
    Ok(Json(CountResponse::from(outcome)))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from(state.service.health().await))
}
