// SPDX-License-Identifier: MIT

//! Tests for user deregistration against the vendor revoke endpoint.
//!
//! A local axum server stands in for the vendor so the status-code
//! contract can be exercised end to end.

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::delete, Router};
use garmin_gateway::error::AppError;
use garmin_gateway::services::garmin::{
    interpret_revoke_status, RevokeOutcome, UserRepository,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

mod common;
use common::{seeded_directory, test_repository, valid_auth_details};

#[derive(Default)]
struct VendorState {
    status: u16,
    hits: AtomicUsize,
    auth_headers: RwLock<Vec<String>>,
}

/// Spawn a stand-in vendor revoke endpoint returning a fixed status.
async fn spawn_vendor(status: u16) -> (String, Arc<VendorState>) {
    let state = Arc::new(VendorState {
        status,
        ..VendorState::default()
    });

    async fn revoke(
        State(state): State<Arc<VendorState>>,
        headers: HeaderMap,
    ) -> StatusCode {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if let Some(auth) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
            state.auth_headers.write().await.push(auth.to_string());
        }
        StatusCode::from_u16(state.status).unwrap()
    }

    let app = Router::new()
        .route("/registration", delete(revoke))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/registration", addr), state)
}

#[test]
fn revoke_status_interpretation() {
    assert_eq!(interpret_revoke_status(200).unwrap(), RevokeOutcome::Revoked);
    assert_eq!(interpret_revoke_status(204).unwrap(), RevokeOutcome::Revoked);
    for code in [400, 401, 403] {
        assert_eq!(
            interpret_revoke_status(code).unwrap(),
            RevokeOutcome::Rejected
        );
    }
    for code in [302, 429, 500, 503] {
        match interpret_revoke_status(code) {
            Err(AppError::BadGateway(_)) => {}
            other => panic!("expected BadGateway for {code}, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn vendor_confirmation_removes_the_backing_document() {
    let (url, vendor) = spawn_vendor(204).await;
    let (directory, store) = seeded_directory(vec![("u1", valid_auth_details("g-1"))]).await;
    directory.get("u1").await.unwrap();
    let repository = test_repository(directory.clone()).with_deregister_endpoint(url);

    repository
        .deregister_user("g-1", "user-token")
        .await
        .unwrap();

    assert_eq!(vendor.hits.load(Ordering::SeqCst), 1);
    assert_eq!(*store.deletions.read().await, vec!["u1".to_string()]);
    assert!(directory.users().is_empty());
}

#[tokio::test]
async fn vendor_rejection_retains_the_document_and_does_not_fail() {
    let (url, vendor) = spawn_vendor(401).await;
    let (directory, store) = seeded_directory(vec![("u1", valid_auth_details("g-1"))]).await;
    directory.get("u1").await.unwrap();
    let repository = test_repository(directory.clone()).with_deregister_endpoint(url);

    repository
        .deregister_user("g-1", "user-token")
        .await
        .unwrap();

    assert_eq!(vendor.hits.load(Ordering::SeqCst), 1);
    assert!(store.deletions.read().await.is_empty());
    assert_eq!(directory.users().len(), 1);
}

#[tokio::test]
async fn unexpected_vendor_status_is_a_bad_gateway() {
    let (url, _) = spawn_vendor(500).await;
    let (directory, store) = seeded_directory(vec![("u1", valid_auth_details("g-1"))]).await;
    directory.get("u1").await.unwrap();
    let repository = test_repository(directory.clone()).with_deregister_endpoint(url);

    match repository.deregister_user("g-1", "user-token").await {
        Err(AppError::BadGateway(_)) => {}
        other => panic!("expected BadGateway, got {:?}", other),
    }
    assert!(store.deletions.read().await.is_empty());
}

#[tokio::test]
async fn empty_access_token_fails_before_any_vendor_call() {
    let (url, vendor) = spawn_vendor(204).await;
    let (directory, _) = seeded_directory(vec![("u1", valid_auth_details("g-1"))]).await;
    let repository = test_repository(directory).with_deregister_endpoint(url);

    match repository.deregister_user("g-1", "").await {
        Err(AppError::BadRequest(_)) => {}
        other => panic!("expected BadRequest, got {:?}", other),
    }
    assert_eq!(vendor.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_user_still_attempts_revocation_without_a_secret() {
    let (url, vendor) = spawn_vendor(204).await;
    let (directory, _) = seeded_directory(vec![]).await;
    let repository = test_repository(directory).with_deregister_endpoint(url);

    // The secret lookup degrades to an empty secret; the vendor call still
    // happens and succeeds.
    repository
        .deregister_user("unknown-service-id", "orphan-token")
        .await
        .unwrap();
    assert_eq!(vendor.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn revoke_request_carries_an_oauth_authorization_header() {
    let (url, vendor) = spawn_vendor(204).await;
    let (directory, _) = seeded_directory(vec![("u1", valid_auth_details("g-1"))]).await;
    directory.get("u1").await.unwrap();
    let repository = test_repository(directory).with_deregister_endpoint(url);

    repository
        .deregister_user("g-1", "user-token")
        .await
        .unwrap();

    let headers = vendor.auth_headers.read().await;
    assert_eq!(headers.len(), 1);
    let auth = &headers[0];
    assert!(auth.starts_with("OAuth "));
    assert!(auth.contains("oauth_token=\"user-token\""));
    assert!(auth.contains("oauth_signature_method=\"HMAC-SHA1\""));
    assert!(auth.contains("oauth_signature=\""));
    assert!(auth.contains("oauth_version=\"1.0\""));
}
