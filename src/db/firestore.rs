// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations for the user directory.
//!
//! Provides:
//! - Bounded point reads of auth-detail and profile documents
//! - Merge writes and deletes of auth-detail documents
//! - A snapshot listener on the Garmin collection, bridged into a bounded
//!   channel consumed by the directory snapshot task

use crate::error::AppError;
use crate::models::{GarminAuthDetails, UserDetails};
use crate::services::directory::DirectoryEvent;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded wait for a single document operation.
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Target id registered for the Garmin collection listener.
const GARMIN_LISTENER_TARGET: u32 = 17;

/// Read/write surface the directory snapshot needs from the document store.
///
/// Failures are IO-failures regardless of underlying cause (interrupted,
/// timed out, transport error).
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Fetch the auth-detail document for a directory id.
    async fn auth_details(&self, uuid: &str) -> Result<Option<GarminAuthDetails>, AppError>;

    /// Fetch the profile document for a directory id.
    async fn user_details(&self, uuid: &str) -> Result<Option<UserDetails>, AppError>;

    /// Delete the auth-detail document for a directory id.
    async fn delete_auth_details(&self, uuid: &str) -> Result<(), AppError>;
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    user_collection: String,
    garmin_collection: String,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(
        project_id: &str,
        user_collection: &str,
        garmin_collection: &str,
    ) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        let client = if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            Self::create_emulator_client(project_id).await?
        } else {
            let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
                AppError::Database(format!("Failed to connect to Firestore: {}", e))
            })?;
            tracing::info!(project = project_id, "Connected to Firestore");
            client
        };

        Ok(Self {
            client: Some(client),
            user_collection: user_collection.to_string(),
            garmin_collection: garmin_collection.to_string(),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<firestore::FirestoreDb, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(client)
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            client: None,
            user_collection: "users".to_string(),
            garmin_collection: "garmin".to_string(),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Io("Database not connected (offline mode)".to_string()))
    }

    /// Run a document operation with the bounded wait, wrapping timeouts and
    /// store failures uniformly as IO-failures.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, AppError>
    where
        F: std::future::Future<Output = Result<T, firestore::errors::FirestoreError>>,
    {
        match tokio::time::timeout(DOCUMENT_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::Io(format!("{what}: {e}"))),
            Err(_) => Err(AppError::Io(format!(
                "{what}: timed out after {}s",
                DOCUMENT_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Start a snapshot listener on the Garmin collection, forwarding
    /// document changes into `events`.
    ///
    /// The returned listener must be kept alive for the lifetime of the
    /// subscription and shut down explicitly on service shutdown.
    pub async fn listen_garmin_collection(
        &self,
        events: mpsc::Sender<DirectoryEvent>,
    ) -> Result<
        firestore::FirestoreListener<
            firestore::FirestoreDb,
            firestore::FirestoreTempFilesListenStateStorage,
        >,
        AppError,
    > {
        use firestore::{
            FirestoreListenEvent, FirestoreListenerTarget, FirestoreTempFilesListenStateStorage,
        };

        let client = self.get_client()?.clone();

        let mut listener = client
            .create_listener(FirestoreTempFilesListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create listener: {}", e)))?;

        client
            .fluent()
            .select()
            .from(self.garmin_collection.as_str())
            .listen()
            .add_target(
                FirestoreListenerTarget::new(GARMIN_LISTENER_TARGET),
                &mut listener,
            )
            .map_err(|e| AppError::Database(format!("Failed to add listener target: {}", e)))?;

        listener
            .start(move |event| {
                let events = events.clone();
                async move {
                    match event {
                        FirestoreListenEvent::DocumentChange(ref change) => {
                            if let Some(doc) = &change.document {
                                if let Some(id) = document_id(&doc.name) {
                                    forward(&events, DirectoryEvent::Upserted(id)).await;
                                }
                            }
                        }
                        FirestoreListenEvent::DocumentDelete(ref delete) => {
                            if let Some(id) = document_id(&delete.document) {
                                forward(&events, DirectoryEvent::Removed(id)).await;
                            }
                        }
                        FirestoreListenEvent::DocumentRemove(ref remove) => {
                            if let Some(id) = document_id(&remove.document) {
                                forward(&events, DirectoryEvent::Removed(id)).await;
                            }
                        }
                        _ => {}
                    }
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start listener: {}", e)))?;

        tracing::info!(
            collection = %self.garmin_collection,
            "Listening for user directory changes"
        );

        Ok(listener)
    }
}

/// Forward a change event, dropping it with a log line if the directory
/// task has stopped consuming.
async fn forward(events: &mpsc::Sender<DirectoryEvent>, event: DirectoryEvent) {
    if let Err(e) = events.send(event).await {
        tracing::warn!(error = %e, "Directory event dropped, consumer gone");
    }
}

/// Last path segment of a full Firestore document name.
fn document_id(name: &str) -> Option<String> {
    name.rsplit('/').next().map(str::to_string)
}

#[async_trait]
impl DirectoryStore for FirestoreDb {
    async fn auth_details(&self, uuid: &str) -> Result<Option<GarminAuthDetails>, AppError> {
        let client = self.get_client()?;
        self.bounded(
            "get auth details",
            client
                .fluent()
                .select()
                .by_id_in(self.garmin_collection.as_str())
                .obj()
                .one(uuid),
        )
        .await
    }

    async fn user_details(&self, uuid: &str) -> Result<Option<UserDetails>, AppError> {
        let client = self.get_client()?;
        self.bounded(
            "get user details",
            client
                .fluent()
                .select()
                .by_id_in(self.user_collection.as_str())
                .obj()
                .one(uuid),
        )
        .await
    }

    async fn delete_auth_details(&self, uuid: &str) -> Result<(), AppError> {
        let client = self.get_client()?;
        self.bounded(
            "delete auth details",
            client
                .fluent()
                .delete()
                .from(self.garmin_collection.as_str())
                .document_id(uuid)
                .execute(),
        )
        .await
    }
}
