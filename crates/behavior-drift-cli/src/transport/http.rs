//! HTTP transport: JSON drift lookups over axum.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use behavior_drift::OnsetRule;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::commands::lookup;
use crate::session::DriftStore;
use crate::types::{ServiceError, ServiceResult};

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        (status, Json(self.to_json())).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OnsetParams {
    pub threshold: Option<f64>,
    pub run_length: Option<usize>,
}

/// Build the router over a loaded store.
pub fn router(store: Arc<DriftStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/drift/score/:entity_id", get(handle_timeline))
        .route("/drift/latest/:entity_id", get(handle_latest))
        .route("/drift/explanation/:entity_id", get(handle_explanation))
        .route("/drift/onset/:entity_id", get(handle_onset))
        .route("/drift/summary/:entity_id", get(handle_summary))
        .layer(cors)
        .with_state(store)
}

/// HTTP server for drift lookups.
pub struct HttpTransport {
    store: Arc<DriftStore>,
}

impl HttpTransport {
    pub fn new(store: DriftStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> ServiceResult<()> {
        let app = router(self.store.clone());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ServiceError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(())
    }
}

fn onset_rule(params: Result<Query<OnsetParams>, QueryRejection>) -> ServiceResult<OnsetRule> {
    let Query(params) = params.map_err(|e| ServiceError::InvalidParams(e.body_text()))?;
    lookup::onset_rule(params.threshold, params.run_length)
}

async fn handle_health(State(store): State<Arc<DriftStore>>) -> impl IntoResponse {
    Json(lookup::health(&store))
}

async fn handle_timeline(
    State(store): State<Arc<DriftStore>>,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(lookup::timeline(&store, &entity_id)?))
}

async fn handle_latest(
    State(store): State<Arc<DriftStore>>,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(lookup::latest(&store, &entity_id)?))
}

async fn handle_explanation(
    State(store): State<Arc<DriftStore>>,
    Path(entity_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(lookup::explanation(&store, &entity_id)?))
}

async fn handle_onset(
    State(store): State<Arc<DriftStore>>,
    Path(entity_id): Path<String>,
    params: Result<Query<OnsetParams>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let rule = onset_rule(params)?;
    Ok(Json(lookup::onset(&store, &entity_id, rule)?))
}

async fn handle_summary(
    State(store): State<Arc<DriftStore>>,
    Path(entity_id): Path<String>,
    params: Result<Query<OnsetParams>, QueryRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let rule = onset_rule(params)?;
    Ok(Json(lookup::summary(&store, &entity_id, rule)?))
}
