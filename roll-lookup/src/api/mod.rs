mod auth;
mod error;
mod handlers;

use std::future::ready;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::service::LookupService;

pub use error::ApiError;
pub use handlers::{ConsultaRequest, LookupFailure, StationResponse};

pub fn router(service: LookupService, token: &str, metrics: Option<PrometheusHandle>) -> Router {
    let token: Arc<str> = Arc::from(token);

    let lookup_router = Router::new()
        .route("/consulta", post(handlers::consulta))
        .route_layer(middleware::from_fn_with_state(token, auth::require_token));

    let status_router = Router::new()
        .route("/health", get(handlers::readiness))
        .route("/_readiness", get(handlers::readiness))
        .route("/_liveness", get(handlers::liveness));

    let router = Router::new()
        .merge(lookup_router)
        .merge(status_router)
        .layer(TraceLayer::new_for_http())
        .with_state(service);

    match metrics {
        Some(handle) => router.route("/metrics", get(move || ready(handle.render()))),
        None => router,
    }
}
