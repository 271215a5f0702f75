//! API request handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, info};

use crate::gate::EventEnvelope;

use super::error::ApiResult;
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Slack Events API webhook.
///
/// POST /slack/events
///
/// Slack expects an immediate 200; accepted turns run as their own task.
pub async fn slack_events(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> ApiResult<Response> {
    if envelope.kind == "url_verification" {
        let challenge = envelope.challenge.unwrap_or_default();
        return Ok(challenge.into_response());
    }

    if let Some(turn) = state.gate.accept(&envelope) {
        info!(
            "accepted DM turn from user={} team={}",
            turn.id.user_id, turn.id.team_id
        );
        let relay = state.relay.clone();
        tokio::spawn(async move {
            if let Err(err) = relay.process(turn).await {
                error!("relay turn failed: {err}");
            }
        });
    }

    Ok(StatusCode::OK.into_response())
}
