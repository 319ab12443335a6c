// SPDX-License-Identifier: MIT

//! Kafka topic metadata facade.

use crate::error::Result;
use crate::services::kafka::TopicInfo;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Topic metadata routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/topics", get(list_topics))
        .route("/topics/{topic}", get(topic_info))
}

/// List topic names (reserved names excluded).
async fn list_topics(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.kafka_admin.list_topics().await?))
}

/// Partition metadata for one topic.
async fn topic_info(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Result<Json<TopicInfo>> {
    Ok(Json(state.kafka_admin.topic_info(&topic).await?))
}
