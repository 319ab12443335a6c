// SPDX-License-Identifier: MIT

//! Router-level tests: auth gating, health check, vendor push surface.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use garmin_gateway::config::Config;
use garmin_gateway::db::FirestoreDb;
use garmin_gateway::middleware::TokenVerifier;
use garmin_gateway::routes::create_router;
use garmin_gateway::services::directory::UserDirectory;
use garmin_gateway::services::garmin::GarminUserRepository;
use garmin_gateway::services::kafka::{ClusterAdmin, KafkaAdminService, TopicInfo};
use garmin_gateway::AppState;
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

mod common;
use common::StubStore;

struct StaticAdmin(Vec<String>);

#[async_trait]
impl ClusterAdmin for StaticAdmin {
    async fn list_topic_names(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }

    async fn describe_topic(&self, topic: &str) -> anyhow::Result<TopicInfo> {
        Ok(TopicInfo {
            name: topic.to_string(),
            partitions: vec![],
        })
    }
}

/// Create a test app with offline mock dependencies.
fn create_test_app() -> axum::Router {
    let config = Config::default();
    let directory = Arc::new(UserDirectory::new(Arc::new(StubStore::default())));
    let user_repository = Arc::new(GarminUserRepository::new(
        directory.clone(),
        config.garmin_consumer_key.clone(),
        config.garmin_consumer_secret.clone(),
    ));
    let kafka_admin = Arc::new(KafkaAdminService::new(Arc::new(StaticAdmin(vec![
        "observations".to_string(),
    ]))));

    let state = Arc::new(AppState {
        config,
        db: FirestoreDb::new_mock(),
        directory,
        user_repository,
        kafka_admin,
        token_verifier: TokenVerifier::new_mock(),
    });

    create_router(state)
}

#[tokio::test]
async fn health_check_needs_no_auth() {
    let app = create_test_app();

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
async fn topics_require_a_bearer_token() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/topics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_bearer_token_is_rejected() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/topics/observations")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_bearer_authorization_is_rejected() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/topics")
                .header(header::AUTHORIZATION, "Basic dXNlcjpwdw==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_deregistration_push_is_accepted() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/garmin/deregister")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"deregistrations": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("X-Content-Type-Options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("X-Frame-Options").unwrap(), "DENY");
}
