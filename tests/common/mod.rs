// SPDX-License-Identifier: MIT

//! Shared helpers for integration tests.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use garmin_gateway::db::DirectoryStore;
use garmin_gateway::error::AppError;
use garmin_gateway::models::{GarminAuthDetails, OauthCredentials, UserDetails, UserInfo};
use garmin_gateway::services::directory::UserDirectory;
use garmin_gateway::services::garmin::GarminUserRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory document store with controllable contents and failure mode.
#[derive(Default)]
pub struct StubStore {
    pub auth_docs: RwLock<HashMap<String, GarminAuthDetails>>,
    pub user_docs: RwLock<HashMap<String, UserDetails>>,
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
    pub deletions: RwLock<Vec<String>>,
}

#[async_trait]
impl DirectoryStore for StubStore {
    async fn auth_details(&self, uuid: &str) -> Result<Option<GarminAuthDetails>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Io("store unreachable".to_string()));
        }
        Ok(self.auth_docs.read().await.get(uuid).cloned())
    }

    async fn user_details(&self, uuid: &str) -> Result<Option<UserDetails>, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Io("store unreachable".to_string()));
        }
        Ok(self.user_docs.read().await.get(uuid).cloned())
    }

    async fn delete_auth_details(&self, uuid: &str) -> Result<(), AppError> {
        self.auth_docs.write().await.remove(uuid);
        self.deletions.write().await.push(uuid.to_string());
        Ok(())
    }
}

/// A complete, valid auth-detail document.
#[allow(dead_code)]
pub fn valid_auth_details(external_id: &str) -> GarminAuthDetails {
    GarminAuthDetails {
        source_id: "garmin".to_string(),
        start_date: Some(1_600_000_000),
        end_date: Some(1_700_000_000),
        version: None,
        oauth_credentials: Some(OauthCredentials {
            datetime: Some(1_600_000_000),
            oauth_tokens: Some(vec!["user-token".to_string()]),
            oauth_token_secrets: Some(vec!["user-secret".to_string()]),
        }),
        user_info: Some(UserInfo {
            user_id: Some(external_id.to_string()),
            error_message: None,
        }),
    }
}

/// Build a directory over a stub store seeded with auth documents.
#[allow(dead_code)]
pub async fn seeded_directory(
    docs: Vec<(&str, GarminAuthDetails)>,
) -> (Arc<UserDirectory>, Arc<StubStore>) {
    let store = Arc::new(StubStore::default());
    {
        let mut auth = store.auth_docs.write().await;
        for (uuid, details) in docs {
            auth.insert(uuid.to_string(), details);
        }
    }
    (Arc::new(UserDirectory::new(store.clone())), store)
}

/// Build a repository with test consumer credentials.
#[allow(dead_code)]
pub fn test_repository(directory: Arc<UserDirectory>) -> GarminUserRepository {
    GarminUserRepository::new(
        directory,
        "test-consumer-key".to_string(),
        "test-consumer-secret".to_string(),
    )
}
