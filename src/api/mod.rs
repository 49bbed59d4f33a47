//! REST API module using Axum
//!
//! HTTP surface for the runtime services:
//! - `GET /health` — runtime status (rate-limited per client)
//! - `POST /health` — threat detection actions
//! - `POST /evolve` — route evolution and component regeneration
//!
//! Every request is timed by `middleware::record_route_metrics`, feeding
//! observed latency back into the route optimizer.

pub mod handlers;
pub mod middleware;
mod routes;

pub use handlers::RuntimeState;

use axum::http::{header, Method};
use axum::middleware as axum_mw;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router: API routes plus metrics, CORS, and
/// trace layers. Registers the served paths with the route optimizer so
/// fitness tracking starts at boot.
pub fn create_app(state: RuntimeState) -> Router {
    for path in ["/health", "/evolve"] {
        state.routing.register_route(path);
    }

    let routing = state.routing.clone();
    routes::api_routes(state)
        .layer(axum_mw::from_fn_with_state(
            routing,
            middleware::record_route_metrics,
        ))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `ARR_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("ARR_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => CorsLayer::new(),
    }
}
