//! HTTP routes.

use crate::error::{ServerError, ServerResult};
use crate::handler::SyncHandler;
use crate::principal::{Principal, PRINCIPAL_HEADER};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use pawlog_sync_protocol::{
    InboundSyncRequest, OwnerId, RecentRecordsQuery, RecentRecordsResponse, RecordId,
    SyncResponse,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    handler: Arc<SyncHandler>,
}

impl AppState {
    /// Wraps a handler.
    pub fn new(handler: Arc<SyncHandler>) -> Self {
        Self { handler }
    }
}

/// Builds the application router.
pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync", post(sync))
        .route("/owners/{owner_id}/records", get(recent_records))
        .route("/owners/{owner_id}/records/{record_id}", delete(delete_record))
        .route_layer(middleware::from_fn(require_principal));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_principal(mut request: Request, next: Next) -> Result<Response, ServerError> {
    let principal = request
        .headers()
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Principal::new)
        .ok_or_else(|| ServerError::Unauthenticated(format!("missing {PRINCIPAL_HEADER} header")))?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Runs store work on the blocking pool.
async fn blocking<T, F>(handler: Arc<SyncHandler>, work: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SyncHandler) -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&handler))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
}

async fn sync(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<InboundSyncRequest>,
) -> ServerResult<Json<SyncResponse>> {
    let response = blocking(state.handler, move |h| h.handle_sync(&principal, request)).await?;
    Ok(Json(response))
}

async fn recent_records(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(owner_id): Path<String>,
    Query(query): Query<RecentRecordsQuery>,
) -> ServerResult<Json<RecentRecordsResponse>> {
    let owner = OwnerId::new(owner_id);
    let response = blocking(state.handler, move |h| {
        h.recent_records(&principal, &owner, &query)
    })
    .await?;
    Ok(Json(response))
}

async fn delete_record(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((owner_id, record_id)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let owner = OwnerId::new(owner_id);
    let id = RecordId::new(record_id);
    blocking(state.handler, move |h| h.delete_record(&principal, &owner, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
