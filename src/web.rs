//! REST bridge over the coordinator, entities and services

use crate::coordinator::Coordinator;
use crate::diagnostics::entry_diagnostics;
use crate::entities::{Entity, EntityState, find_entity};
use crate::entry::{ConfigEntry, LoadedEntry};
use crate::error::HomevoltError;
use crate::services::{ServiceCall, ServiceRegistry};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub entry: Arc<ConfigEntry>,
    pub coordinator: Arc<Coordinator>,
    pub entities: Arc<Vec<Entity>>,
    pub services: Arc<ServiceRegistry>,
}

impl AppState {
    pub fn new(loaded: &LoadedEntry, services: Arc<ServiceRegistry>) -> Self {
        Self {
            entry: Arc::new(loaded.entry.clone()),
            coordinator: Arc::clone(&loaded.coordinator),
            entities: Arc::new(loaded.entities.clone()),
            services,
        }
    }
}

#[derive(Deserialize)]
pub struct SetValueBody {
    pub value: Value,
}

/// Error rendered as `{"error", "translation_key"}` with a matching status
pub struct ApiError(pub HomevoltError);

impl From<HomevoltError> for ApiError {
    fn from(err: HomevoltError) -> Self {
        Self(err)
    }
}

pub const fn status_for(err: &HomevoltError) -> StatusCode {
    match err {
        HomevoltError::Validation { .. } => StatusCode::BAD_REQUEST,
        HomevoltError::NotFound { .. } => StatusCode::NOT_FOUND,
        HomevoltError::NotLocalMode { .. } => StatusCode::CONFLICT,
        HomevoltError::Auth { .. } => StatusCode::UNAUTHORIZED,
        HomevoltError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        HomevoltError::Connection { .. }
        | HomevoltError::Command { .. }
        | HomevoltError::Api { .. }
        | HomevoltError::UpdateFailed { .. } => StatusCode::BAD_GATEWAY,
        HomevoltError::Config { .. }
        | HomevoltError::Serialization { .. }
        | HomevoltError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.0.to_string(),
            "translation_key": self.0.translation_key(),
        });
        (status_for(&self.0), Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    let mut root = json!({
        "entry_id": state.entry.entry_id,
        "title": state.entry.title,
        "host": coordinator.host(),
        "device_id": coordinator.device_id(),
        "device_name": coordinator.device_name(),
        "firmware_version": coordinator.firmware_version(),
        "is_leader": coordinator.is_leader(),
        "last_update_success": coordinator.last_update_success(),
        "last_update": coordinator.last_update().map(|t| t.to_rfc3339()),
        "update_interval_secs": coordinator.update_interval().as_secs(),
    });
    if coordinator.is_leader() {
        root["cluster_id"] = Value::String(coordinator.cluster_id());
        root["cluster_name"] = Value::String(coordinator.cluster_name());
    }
    Json(root)
}

async fn data(State(state): State<AppState>) -> impl IntoResponse {
    Json(Value::Object((*state.coordinator.data()).clone()))
}

async fn entities(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.coordinator.data();
    let states: Vec<EntityState> = state.entities.iter().map(|e| e.state(&data)).collect();
    Json(states)
}

async fn diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    Json(entry_diagnostics(&state.entry, &state.coordinator))
}

async fn refresh(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.coordinator.refresh().await?;
    Ok(Json(json!({
        "ok": true,
        "last_update": state.coordinator.last_update().map(|t| t.to_rfc3339()),
    })))
}

async fn call_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let call = ServiceCall::from_parts(&service, body)?;
    state.services.call(&call).await?;
    Ok(Json(json!({"ok": true, "service": call.name()})))
}

fn lookup<'a>(state: &'a AppState, unique_id: &str) -> ApiResult<&'a Entity> {
    find_entity(&state.entities, unique_id)
        .ok_or_else(|| HomevoltError::not_found(format!("Entity {unique_id} not found")).into())
}

async fn set_entity(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
    Json(body): Json<SetValueBody>,
) -> ApiResult<Json<EntityState>> {
    let entity = lookup(&state, &unique_id)?;
    entity.set_value(&state.coordinator, &body.value).await?;
    Ok(Json(entity.state(&state.coordinator.data())))
}

async fn press_entity(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let entity = lookup(&state, &unique_id)?;
    entity.press(&state.coordinator).await?;
    Ok(Json(json!({"ok": true, "unique_id": unique_id})))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/data", get(data))
        .route("/api/entities", get(entities))
        .route("/api/diagnostics", get(diagnostics))
        .route("/api/refresh", post(refresh))
        .route("/api/services/{service}", post(call_service))
        .route("/api/entities/{unique_id}/set", post(set_entity))
        .route("/api/entities/{unique_id}/press", post(press_entity))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the bridge until `shutdown` fires
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let router = build_router(state);

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={host}, port={port}"
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{host}'; falling back to 127.0.0.1"));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    logger.info("Web server stopped");
    Ok(())
}
