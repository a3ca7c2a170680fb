//! HTTP surface of the watchdog
//!
//! Trigger routes run enforcement passes and are open to everyone so that
//! cron jobs or other services can drive the engine. View and admin routes
//! honour the client prefix allow-list.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AccessConfig;
use crate::limits::{EngineError, EnforcementEngine, PassReport, TickOutcome, ViewState};

/// State shared by every handler
pub struct AppState {
    engine: Arc<EnforcementEngine>,
    sessions: RwLock<HashMap<Uuid, ViewState>>,
    access: AccessConfig,
    default_user: Option<String>,
}

impl AppState {
    pub fn new(
        engine: Arc<EnforcementEngine>,
        access: AccessConfig,
        default_user: Option<String>,
    ) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            access,
            default_user,
        }
    }

    fn check_access(&self, peer: &SocketAddr) -> Result<(), ApiError> {
        let ip = peer.ip().to_string();
        if self.access.is_access_granted(&ip) {
            Ok(())
        } else {
            tracing::warn!("Refused request from {}", ip);
            Err(ApiError::Forbidden(ip))
        }
    }

    /// User a session should show when none is asked for
    fn fallback_user(&self) -> Option<String> {
        self.default_user
            .as_ref()
            .filter(|id| self.engine.is_selected(id))
            .cloned()
            .or_else(|| self.engine.users().first().map(|u| u.id.clone()))
    }
}

pub type SharedState = Arc<AppState>;

/// Errors returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("access denied for {0}")]
    Forbidden(String),

    #[error("no users are subject to limits")]
    NoUsers,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NoUsers => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::Remote(_)) => StatusCode::BAD_GATEWAY,
        };

        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    session: Option<Uuid>,
    user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    session: Uuid,
    #[serde(flatten)]
    view: ViewState,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<TickOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct LimitRequest {
    delta: i64,
}

#[derive(Debug, Serialize)]
pub struct LimitResponse {
    user_id: String,
    altered_limit: u32,
    outcome: TickOutcome,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DisabledRequest {
    disabled: bool,
}

/// Build the router over shared state
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/trigger", get(trigger_all))
        .route("/trigger/{user_id}", get(trigger_user))
        .route("/view", get(view))
        .route("/users/{user_id}/limit", post(alter_limit))
        .route("/users/{user_id}/disabled", post(set_disabled))
        .with_state(state)
}

async fn trigger_all(State(state): State<SharedState>) -> Json<PassReport> {
    let report = state.engine.tick_all().await;
    tracing::info!(
        "Pass for {}: {} locked, {} unlocked, {} failed, {} timed out",
        report.day,
        report.count(TickOutcome::Locked),
        report.count(TickOutcome::Unlocked),
        report.count(TickOutcome::Failed),
        report.count(TickOutcome::TimedOut)
    );
    Json(report)
}

async fn trigger_user(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Json<TriggerResponse> {
    let Some(user) = state.engine.user(&user_id) else {
        return Json(TriggerResponse {
            name: "unknown".to_string(),
            outcome: None,
        });
    };

    let outcome = state.engine.tick(&user_id).await;
    Json(TriggerResponse {
        name: user.name.clone(),
        outcome: Some(outcome),
    })
}

async fn view(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ViewResponse>, ApiError> {
    state.check_access(&peer)?;

    let existing = match query.session {
        Some(id) => state.sessions.read().await.get(&id).cloned().map(|v| (id, v)),
        None => None,
    };
    let (session, mut view) = existing.unwrap_or_else(|| {
        let id = Uuid::new_v4();
        tracing::debug!("New view session {}", id);
        (id, ViewState::new())
    });

    let user_id = query
        .user
        .or_else(|| view.user_id.clone())
        .or_else(|| state.fallback_user())
        .ok_or(ApiError::NoUsers)?;

    state.engine.refresh(&mut view, &user_id).await?;
    state.sessions.write().await.insert(session, view.clone());

    Ok(Json(ViewResponse { session, view }))
}

async fn alter_limit(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(request): Json<LimitRequest>,
) -> Result<Json<LimitResponse>, ApiError> {
    state.check_access(&peer)?;

    let altered_limit = state.engine.alter_limit(&user_id, request.delta).await?;
    let outcome = state.engine.tick(&user_id).await;

    Ok(Json(LimitResponse {
        user_id,
        altered_limit,
        outcome,
    }))
}

async fn set_disabled(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(request): Json<DisabledRequest>,
) -> Result<Json<DisabledRequest>, ApiError> {
    state.check_access(&peer)?;

    state.engine.set_disabled(&user_id, request.disabled).await?;
    Ok(Json(request))
}
