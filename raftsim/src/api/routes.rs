//! Route configuration for the control plane.

use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{
    chaos_handler, command_handler, health_handler, start_handler, status_handler, stop_handler,
};
use crate::control::SimulationHandle;

/// Create the full router with all control routes.
pub fn create_router(handle: SimulationHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/raft", raft_routes())
        .with_state(handle)
}

fn raft_routes() -> Router<SimulationHandle> {
    Router::new()
        .route("/status", get(status_handler))
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .route("/chaos", post(chaos_handler))
        .route("/command", post(command_handler))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::api::{ActionResponse, CommandResponse, ErrorResponse, HealthResponse};
    use crate::config::{ServerConfig, SimulationConfig};

    fn create_test_handle(time_scale: f64) -> SimulationHandle {
        let config = ServerConfig {
            listen_port: 0,
            simulation: SimulationConfig::new(42).with_node_count(3),
            time_scale,
        };
        SimulationHandle::spawn(&config).0
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_router_health() {
        let app = create_router(create_test_handle(1.0));
        let (status, body) = send(&app, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let app = create_router(create_test_handle(1.0));
        let (status, body) = send(&app, Method::GET, "/raft/status", "").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["running"], false);
        assert!(json["snapshot"].is_null());
    }

    #[tokio::test]
    async fn test_command_before_start_conflicts() {
        let app = create_router(create_test_handle(1.0));
        let (status, body) =
            send(&app, Method::POST, "/raft/command", r#"{"command":"x"}"#).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("started"));
    }

    #[tokio::test]
    async fn test_start_with_partial_config() {
        let app = create_router(create_test_handle(1.0));
        let (status, body) = send(
            &app,
            Method::POST,
            "/raft/start",
            r#"{"node_count": 4, "random_seed": 7}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ack: ActionResponse = serde_json::from_slice(&body).unwrap();
        assert!(ack.ok);

        let (_, body) = send(&app, Method::GET, "/raft/status", "").await;
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["snapshot"]["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(json["summary"]["nodes"], 4);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_config() {
        let app = create_router(create_test_handle(1.0));
        let (status, _) = send(
            &app,
            Method::POST,
            "/raft/start",
            r#"{"message_drop_rate": 3.0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/raft/start", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chaos_and_stop() {
        let app = create_router(create_test_handle(10.0));
        let (status, _) = send(&app, Method::POST, "/raft/start", "").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/raft/chaos",
            r#"{"kind":"crash","node_id":"node_0","recovery_time":50.0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ack: ActionResponse = serde_json::from_slice(&body).unwrap();
        assert!(ack.ok);

        let (status, body) =
            send(&app, Method::POST, "/raft/chaos", r#"{"kind":"meteor"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let ack: ActionResponse = serde_json::from_slice(&body).unwrap();
        assert!(!ack.ok);

        let (status, _) = send(
            &app,
            Method::POST,
            "/raft/chaos",
            r#"{"kind":"crash","node_id":"ghost"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/raft/stop", "").await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/raft/status", "").await;
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["active_failures"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_command_reaches_leader() {
        let app = create_router(create_test_handle(40.0));
        send(&app, Method::POST, "/raft/start", "").await;

        let deadline = Instant::now() + Duration::from_secs(10);
        let response = loop {
            let (status, body) =
                send(&app, Method::POST, "/raft/command", r#"{"command":"set x 1"}"#).await;
            if status == StatusCode::OK {
                break body;
            }
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(Instant::now() < deadline, "no leader elected");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        let response: CommandResponse = serde_json::from_slice(&response).unwrap();
        assert_eq!(response.command, "set x 1");
        assert!(response.leader.starts_with("node_"));
    }
}
