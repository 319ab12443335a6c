// SPDX-License-Identifier: MIT

//! Garmin push notification routes.

use crate::error::AppError;
use crate::services::garmin::UserRepository;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Garmin push routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/garmin/deregister", post(handle_deregistrations))
}

/// One entry of a Garmin deregistration push payload.
#[derive(Debug, Deserialize)]
struct Deregistration {
    #[serde(rename = "userAccessToken")]
    user_access_token: String,
    #[serde(rename = "userId")]
    user_id: String,
}

/// Deregistration push payload.
#[derive(Debug, Deserialize)]
struct DeregistrationPayload {
    #[serde(default)]
    deregistrations: Vec<Deregistration>,
}

/// Handle a batch of vendor deregistration notifications.
///
/// Entries are processed independently; a vendor-side rejection for one
/// user never blocks the rest. Only an unreachable vendor surfaces as a
/// gateway failure so the push gets retried.
async fn handle_deregistrations(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeregistrationPayload>,
) -> StatusCode {
    tracing::info!(
        count = payload.deregistrations.len(),
        "Deregistration push received"
    );

    let mut upstream_failed = false;
    for entry in &payload.deregistrations {
        match state
            .user_repository
            .deregister_user(&entry.user_id, &entry.user_access_token)
            .await
        {
            Ok(()) => {}
            Err(AppError::BadGateway(msg)) => {
                tracing::error!(user_id = %entry.user_id, error = %msg, "Deregistration failed upstream");
                upstream_failed = true;
            }
            Err(e) => {
                tracing::error!(user_id = %entry.user_id, error = %e, "Deregistration failed");
            }
        }
    }

    if upstream_failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    }
}
