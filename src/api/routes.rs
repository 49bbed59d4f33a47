//! API route definitions
//!
//! - GET  /health — runtime status (rate-limited)
//! - POST /health — threat detection actions
//! - POST /evolve — route evolution / component regeneration

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, RuntimeState};

/// Create the API routes for the runtime surface.
pub fn api_routes(state: RuntimeState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health).post(handlers::post_health))
        .route("/evolve", post(handlers::post_evolve))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::supervisor::RuntimeSupervisor;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn create_test_state() -> RuntimeState {
        let supervisor = RuntimeSupervisor::new(RuntimeConfig::default());
        RuntimeState::from_supervisor(&supervisor)
    }

    #[tokio::test]
    async fn test_get_health_returns_200() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_health_unknown_action_is_400() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/health")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"warp_drive"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_evolve_routes_succeeds() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/evolve")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"action":"evolve_routes"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
