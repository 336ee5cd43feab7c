//! HTTP request handlers for the control plane.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::{
    ActionResponse, ChaosBody, CommandBody, CommandResponse, ErrorResponse, HealthResponse,
};
use crate::config::SimulationConfig;
use crate::control::{ChaosRequest, ControlError, SimulationHandle};
use crate::engine::SimulationError;
use crate::types::NodeId;

/// Handler for `GET /health` - liveness probe.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Handler for `GET /raft/status`.
pub async fn status_handler(State(handle): State<SimulationHandle>) -> impl IntoResponse {
    Json((*handle.status()).clone())
}

/// Handler for `POST /raft/start`.
///
/// An empty body starts with the server's default configuration.
pub async fn start_handler(State(handle): State<SimulationHandle>, body: Bytes) -> Response {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<SimulationConfig>(&body) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::debug!("rejecting start request: {e}");
                return error_response(StatusCode::BAD_REQUEST, format!("invalid config: {e}"));
            }
        }
    };
    match handle.start(config).await {
        Ok(()) => Json(ActionResponse::new(true, "simulation started")).into_response(),
        Err(e) => control_error(&e),
    }
}

/// Handler for `POST /raft/stop`.
pub async fn stop_handler(State(handle): State<SimulationHandle>) -> Response {
    match handle.stop().await {
        Ok(()) => Json(ActionResponse::new(true, "simulation stopped")).into_response(),
        Err(e) => control_error(&e),
    }
}

/// Handler for `POST /raft/chaos`.
///
/// Unsupported kinds are acknowledged with `ok: false` rather than an error
/// status.
pub async fn chaos_handler(
    State(handle): State<SimulationHandle>,
    Json(body): Json<ChaosBody>,
) -> Response {
    let request = ChaosRequest {
        kind: body.kind.clone(),
        node: body.node_id.map(NodeId::from),
        recovery_time: body.recovery_time,
    };
    match handle.chaos(request).await {
        Ok(true) => Json(ActionResponse::new(true, format!("{} injected", body.kind))).into_response(),
        Ok(false) => Json(ActionResponse::new(
            false,
            format!("{} ignored", body.kind),
        ))
        .into_response(),
        Err(e) => control_error(&e),
    }
}

/// Handler for `POST /raft/command` - submit to the current leader.
pub async fn command_handler(
    State(handle): State<SimulationHandle>,
    Json(body): Json<CommandBody>,
) -> Response {
    match handle.submit(body.command.clone()).await {
        Ok(leader) => Json(CommandResponse {
            leader: leader.to_string(),
            command: body.command,
        })
        .into_response(),
        Err(e) => control_error(&e),
    }
}

fn control_error(error: &ControlError) -> Response {
    let status = match error {
        ControlError::NotStarted => StatusCode::CONFLICT,
        ControlError::NoLeader => StatusCode::SERVICE_UNAVAILABLE,
        ControlError::Config(_)
        | ControlError::Simulation(
            SimulationError::UnknownNode(_)
            | SimulationError::InvalidEvent { .. }
            | SimulationError::InvalidTimestamp { .. },
        ) => StatusCode::BAD_REQUEST,
        ControlError::Simulation(SimulationError::QueueCorrupted(_)) | ControlError::WorkerGone => {
            tracing::error!("control request failed: {error}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, error.to_string())
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
