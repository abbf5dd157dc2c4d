//! HTTP API for Cascade Core.
//!
//! Inbound share, forward and engagement events are accepted as JSON; query
//! projections, health, Prometheus metrics and a server-sent stream of
//! summary updates are served under the same router.
//!
//! # Routes
//!
//! - `/health`, `/metrics` (unversioned)
//! - `/api/v1/events`, `/api/v1/shares` (ingress)
//! - `/api/v1/cascades/...` (ingress per cascade and queries)
//! - `/api/v1/summaries/stream` (SSE)

mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::builder::TreeBuilder;
use crate::feed::SummaryFeed;
use crate::query::CascadeQueryService;
use crate::store::PropagationStore;
use crate::telemetry::{MetricsRegistry, RequestDurationHistogram};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub builder: TreeBuilder,
    pub query: CascadeQueryService,
    pub feed: SummaryFeed,
    pub metrics: MetricsRegistry,
}

impl AppState {
    /// Wire the builder and query service to one store and feed.
    pub fn new(store: Arc<dyn PropagationStore>, feed: SummaryFeed, metrics: MetricsRegistry) -> Self {
        Self {
            builder: TreeBuilder::new(Arc::clone(&store), feed.clone()),
            query: CascadeQueryService::new(store),
            feed,
            metrics,
        }
    }
}

/// Build the API router.
///
/// ```rust,ignore
/// let state = AppState::new(store, SummaryFeed::new(1024), metrics);
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1_router())
        .route_layer(axum_middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/events", post(handlers::post_event))
        .route("/shares", post(handlers::create_share))
        .route("/cascades", get(handlers::list_cascades))
        .route("/cascades/:root_id", get(handlers::get_cascade))
        .route("/cascades/:root_id/summary", get(handlers::get_summary))
        .route("/cascades/:root_id/frontier", get(handlers::get_frontier))
        .route("/cascades/:root_id/forwards", post(handlers::forward))
        .route("/cascades/:root_id/engagements", post(handlers::engage))
        .route(
            "/cascades/:root_id/users/:user_id",
            get(handlers::get_user_position),
        )
        .route(
            "/cascades/:root_id/users/:user_id/path",
            get(handlers::get_path),
        )
        .route(
            "/cascades/:root_id/nodes/:node_id/children",
            get(handlers::list_children),
        )
        .route("/cascades/:root_id/rebuild", post(handlers::rebuild_summary))
        .route("/cascades/:root_id/verify", get(handlers::verify))
        .route("/summaries/stream", get(handlers::stream_summaries))
}

/// Record duration and count of every routed request.
async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    RequestDurationHistogram::record(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// API response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "test data");
    }
}
