//! API request handlers with proper error propagation.
//!
//! All handlers return `Result<impl IntoResponse, CascadeError>` so that
//! errors are converted to the matching HTTP status codes by the
//! `IntoResponse` implementation on `CascadeError`.

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::cascade::{EngagementAction, NodeId, RootId, UserId};
use crate::error::{CascadeError, ErrorCode, Result};
use crate::events::{CascadeEvent, EngagementEvent, EventOutcome, ForwardEvent, ShareEvent};

/// Unwrap a JSON body, reporting malformed input in the standard error shape.
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        CascadeError::new(ErrorCode::InvalidInput, rejection.body_text())
    })
}

/// `Path` whose rejection (a malformed uuid, say) uses the standard error
/// shape instead of axum's plain-text body.
pub struct PathParams<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = CascadeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Path(params) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(params))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health and Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "cascades": state.query.cascade_count(),
        "feed_subscribers": state.feed.subscriber_count(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ingress
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn post_event(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CascadeEvent>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let outcome = state.builder.apply(body(payload)?)?;

    let status = match &outcome {
        EventOutcome::RootCreated { .. } => StatusCode::CREATED,
        EventOutcome::Forwarded(forward) if !forward.replayed => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::success(outcome))))
}

pub async fn create_share(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ShareEvent>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let root = state.builder.share(body(payload)?)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(root))))
}

#[derive(Debug, Deserialize)]
pub struct ForwardRequest {
    pub acting_user: UserId,
    pub via_node_id: NodeId,
}

pub async fn forward(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
    payload: std::result::Result<Json<ForwardRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let req = body(payload)?;
    let outcome = state.builder.forward(ForwardEvent {
        root_id: RootId(root_id),
        acting_user: req.acting_user,
        via_node_id: req.via_node_id,
    })?;

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::success(outcome))))
}

#[derive(Debug, Deserialize)]
pub struct EngagementRequest {
    pub user_id: UserId,
    pub action: EngagementAction,
}

pub async fn engage(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
    payload: std::result::Result<Json<EngagementRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let req = body(payload)?;
    let node = state.builder.engage(EngagementEvent {
        root_id: RootId(root_id),
        user_id: req.user_id,
        action: req.action,
    })?;
    Ok(Json(ApiResponse::success(node)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_cascades(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.query.list_cascades()))
}

pub async fn get_cascade(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.query.get_cascade(RootId(root_id))?;
    Ok(Json(ApiResponse::success(view)))
}

pub async fn get_summary(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
) -> Result<impl IntoResponse> {
    let summary = state.query.get_summary(RootId(root_id))?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn get_frontier(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
) -> Result<impl IntoResponse> {
    let frontier = state.query.get_frontier(RootId(root_id))?;
    Ok(Json(ApiResponse::success(frontier)))
}

pub async fn get_user_position(
    State(state): State<AppState>,
    PathParams((root_id, user_id)): PathParams<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let position = state
        .query
        .get_user_position(RootId(root_id), &UserId::new(user_id))?;
    Ok(Json(ApiResponse::success(position)))
}

pub async fn get_path(
    State(state): State<AppState>,
    PathParams((root_id, user_id)): PathParams<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let path = state.query.get_path(RootId(root_id), &UserId::new(user_id))?;
    Ok(Json(ApiResponse::success(path)))
}

pub async fn list_children(
    State(state): State<AppState>,
    PathParams((root_id, node_id)): PathParams<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let children = state
        .query
        .list_children(RootId(root_id), NodeId(node_id))?;
    Ok(Json(ApiResponse::success(children)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Maintenance
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn rebuild_summary(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
) -> Result<impl IntoResponse> {
    let rebuild = state.builder.rebuild_summary(RootId(root_id))?;
    Ok(Json(ApiResponse::success(rebuild)))
}

pub async fn verify(
    State(state): State<AppState>,
    PathParams(root_id): PathParams<Uuid>,
) -> Result<impl IntoResponse> {
    let audit = state.query.verify(RootId(root_id))?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "consistent": audit.is_consistent(),
        "audit": audit,
    }))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Summary Stream
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct StreamFilter {
    /// Only forward updates of this cascade
    pub root_id: Option<Uuid>,
}

pub async fn stream_summaries(
    State(state): State<AppState>,
    Query(filter): Query<StreamFilter>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.feed.subscribe()).filter_map(move |update| {
        match update {
            Ok(update) if filter.root_id.map_or(true, |id| update.root_id.0 == id) => Event::default()
                .event("summary")
                .id(update.sequence.to_string())
                .json_data(&update)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Ok(Event::default()
                .event("lagged")
                .data(skipped.to_string()))),
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
