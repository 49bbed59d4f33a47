//! API middleware layers.
//!
//! Times every request and records the observed latency against the
//! route optimizer, so fitness reflects real serving performance.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::routing::RouteFitnessOptimizer;

/// Axum middleware that feeds per-request latency into the route
/// optimizer. Paths that were never registered are ignored by
/// `record_access`, so this layer is safe on any route.
pub async fn record_route_metrics(
    State(routing): State<Arc<RouteFitnessOptimizer>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    routing.record_access(&path, elapsed_ms);

    response
}
