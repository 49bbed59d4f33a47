//! API route handlers
//!
//! Request handling for the runtime surface. Client identity is taken
//! from the `x-client-id` header, falling back to `"anonymous"` — this
//! is deliberately unauthenticated (documented non-goal), so the header
//! is trivially spoofable and the limiter should be treated as
//! best-effort politeness, not an enforcement boundary.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::immunity::{AdaptiveThreatDetector, Antibody, DetectorStatus, TCell, ThreatKind};
use crate::limiter::{LimiterStatus, RegenerativeLimiter};
use crate::routing::{RouteFitnessOptimizer, RouteRecord};
use crate::supervisor::RuntimeSupervisor;
use crate::vitality::{ComponentHealthTracker, RegenOutcome};

/// Header carrying the caller's self-reported identity.
const CLIENT_ID_HEADER: &str = "x-client-id";

/// Fallback identity when the header is absent or unreadable.
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Number of antibodies / T-cells sampled into the health report.
const SAMPLE_LIMIT: usize = 5;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers: cloned service handles owned by the
/// supervisor.
#[derive(Clone)]
pub struct RuntimeState {
    pub limiter: Arc<RegenerativeLimiter>,
    pub vitality: Arc<ComponentHealthTracker>,
    pub immunity: Arc<AdaptiveThreatDetector>,
    pub routing: Arc<RouteFitnessOptimizer>,
}

impl RuntimeState {
    pub fn from_supervisor(supervisor: &RuntimeSupervisor) -> Self {
        Self {
            limiter: supervisor.limiter(),
            vitality: supervisor.vitality(),
            immunity: supervisor.immunity(),
            routing: supervisor.routing(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// 429 body returned when the caller's token bucket is empty.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedResponse {
    error: &'static str,
    message: &'static str,
    rate_limit_status: LimiterStatus,
}

/// Generic 4xx error body.
#[derive(Debug, Serialize)]
struct ApiError {
    error: &'static str,
}

/// Immune system section of the health report: aggregate counters plus
/// small samples of the underlying records.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImmuneSystemReport {
    #[serde(flatten)]
    status: DetectorStatus,
    antibody_samples: Vec<Antibody>,
    t_cell_samples: Vec<TCell>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    immune_system: ImmuneSystemReport,
    rate_limiting: LimiterStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectThreatResponse {
    blocked: bool,
    immune_status: DetectorStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvolveRoutesResponse {
    success: bool,
    routes: Vec<RouteRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateComponentResponse {
    success: bool,
    health: f64,
    generation: u64,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DetectThreatRequest {
    signature: String,
    #[serde(rename = "type")]
    kind: Option<ThreatKind>,
    severity: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateComponentRequest {
    component_id: String,
}

// ============================================================================
// Admission
// ============================================================================

/// Extract the caller's identity from the request headers.
fn client_id(headers: &HeaderMap) -> String {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

/// Consume one token for the caller, or build the 429 response.
fn admit(limiter: &RegenerativeLimiter, headers: &HeaderMap) -> Result<String, Response> {
    let client = client_id(headers);
    if !limiter.consume_token(&client) {
        debug!(client = %client, "request throttled");
        let body = RateLimitedResponse {
            error: "Rate limit exceeded",
            message: "Admission tokens depleted. Please wait for regeneration.",
            rate_limit_status: limiter.status(&client),
        };
        return Err((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response());
    }
    Ok(client)
}

fn unknown_action() -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: "Unknown action" })).into_response()
}

fn invalid_body() -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: "Invalid request body" })).into_response()
}

// ============================================================================
// GET /health
// ============================================================================

/// Runtime status: immune system counters with record samples, plus the
/// caller's rate limit state.
pub async fn get_health(State(state): State<RuntimeState>, headers: HeaderMap) -> Response {
    let client = match admit(&state.limiter, &headers) {
        Ok(client) => client,
        Err(throttled) => return throttled,
    };

    let mut antibody_samples = state.immunity.antibodies();
    antibody_samples.truncate(SAMPLE_LIMIT);
    let mut t_cell_samples = state.immunity.active_t_cells();
    t_cell_samples.truncate(SAMPLE_LIMIT);

    let body = HealthResponse {
        status: "operational",
        timestamp: Utc::now().to_rfc3339(),
        immune_system: ImmuneSystemReport {
            status: state.immunity.status(),
            antibody_samples,
            t_cell_samples,
        },
        rate_limiting: state.limiter.status(&client),
    };
    Json(body).into_response()
}

// ============================================================================
// POST /health
// ============================================================================

/// Health actions. Currently `detect_threat`; unknown discriminators
/// are a 400.
pub async fn post_health(
    State(state): State<RuntimeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(throttled) = admit(&state.limiter, &headers) {
        return throttled;
    }

    match body.get("action").and_then(Value::as_str) {
        Some("detect_threat") => {
            let Ok(req) = serde_json::from_value::<DetectThreatRequest>(body.clone()) else {
                return invalid_body();
            };
            let blocked = state.immunity.detect(
                &req.signature,
                req.kind.unwrap_or(ThreatKind::Malware),
                req.severity.unwrap_or(0.5),
            );
            Json(DetectThreatResponse {
                blocked,
                immune_status: state.immunity.status(),
            })
            .into_response()
        }
        _ => unknown_action(),
    }
}

// ============================================================================
// POST /evolve
// ============================================================================

/// Evolution actions: force a route evolution step, or regenerate a
/// named component.
pub async fn post_evolve(
    State(state): State<RuntimeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(throttled) = admit(&state.limiter, &headers) {
        return throttled;
    }

    match body.get("action").and_then(Value::as_str) {
        Some("evolve_routes") => {
            state.routing.evolve();
            Json(EvolveRoutesResponse {
                success: true,
                routes: state.routing.all_routes(),
            })
            .into_response()
        }
        Some("regenerate_component") => {
            let Ok(req) = serde_json::from_value::<RegenerateComponentRequest>(body.clone()) else {
                return invalid_body();
            };
            // Damage first so the regeneration trigger always has work
            // to do, mirroring the manual-regeneration flow upstream.
            state
                .vitality
                .report_error(&req.component_id, "manual regeneration request");
            let (health, generation) = match state.vitality.try_regenerate(&req.component_id) {
                RegenOutcome::Regenerated { health, generation }
                | RegenOutcome::AlreadyHealthy { health, generation } => (health, generation),
                // report_error registers implicitly, so this arm is
                // unreachable in practice; answer conservatively.
                RegenOutcome::Unknown => (0.0, 0),
            };
            Json(RegenerateComponentResponse {
                success: true,
                health,
                generation,
            })
            .into_response()
        }
        _ => unknown_action(),
    }
}
