use std::future::ready;
use std::sync::Arc;

use axum::extract::{Query, State as AxumState};
use axum::http::{HeaderMap, Method};
use axum::response::IntoResponse;
use axum::{
    routing::{get, post},
    Router,
};
use axum_client_ip::InsecureClientIp;
use bytes::Bytes;
use serde::Deserialize;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::api::IngestResponse;
use crate::handler::IngestionHandler;
use crate::health::HealthCheck;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::validation::IngestRequest;

#[derive(Clone)]
pub struct State {
    pub handler: Arc<IngestionHandler>,
    pub health: HealthCheck,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IngestQuery {
    pub client_id: Option<String>,
}

async fn index() -> &'static str {
    "basket"
}

fn ingest_request(
    query: IngestQuery,
    ip: InsecureClientIp,
    headers: HeaderMap,
    body: &Bytes,
) -> IngestRequest {
    IngestRequest {
        client_id: query.client_id,
        headers,
        ip: ip.0.to_string(),
        body_len: body.len(),
    }
}

async fn event(
    AxumState(state): AxumState<State>,
    ip: InsecureClientIp,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> IngestResponse {
    let request = ingest_request(query, ip, headers, &body);
    state.handler.single(request, &body).await
}

async fn batch(
    AxumState(state): AxumState<State>,
    ip: InsecureClientIp,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> IngestResponse {
    let request = ingest_request(query, ip, headers, &body);
    state.handler.batch(request, &body).await
}

async fn basic_health(AxumState(state): AxumState<State>) -> impl IntoResponse {
    state.health.basic()
}

async fn detailed_health(AxumState(state): AxumState<State>) -> impl IntoResponse {
    state.health.detailed().await
}

pub fn router(handler: Arc<IngestionHandler>, health: HealthCheck, metrics: bool) -> Router {
    let state = State { handler, health };

    // SDKs run on arbitrary customer origins, with credentials.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let router = Router::new()
        .route("/", get(index).post(event))
        .route("/batch", post(batch))
        .route("/health", get(basic_health))
        .route("/health/detailed", get(detailed_health))
        .route("/_liveness", get(index))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to: the recorder is global, and
    // tests build many routers in one process.
    if metrics {
        match setup_metrics_recorder() {
            Ok(recorder_handle) => {
                router.route("/metrics", get(move || ready(recorder_handle.render())))
            }
            Err(err) => {
                error!("failed to install the prometheus recorder: {}", err);
                router
            }
        }
    } else {
        router
    }
}
