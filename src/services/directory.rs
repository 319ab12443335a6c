// SPDX-License-Identifier: MIT

//! Live snapshot of the external user directory.
//!
//! A change feed on the Garmin collection drives the snapshot: every
//! upserted document is re-read together with its profile document,
//! validated, and swapped in atomically. Readers only ever observe a
//! complete record or none at all. A `has_pending_updates` flag tells the
//! downstream synchronization when the user set has changed; it is drained
//! through [`UserDirectory::apply_updates`].

use crate::db::DirectoryStore;
use crate::error::AppError;
use crate::models::GarminUser;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One change delivered by the directory's push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// A document was added or modified.
    Upserted(String),
    /// A document was deleted (or dropped out of the watched query).
    Removed(String),
}

/// In-memory mapping from directory id to credential record.
pub struct UserDirectory {
    store: Arc<dyn DirectoryStore>,
    users: DashMap<String, Arc<GarminUser>>,
    /// Starts true: a fresh snapshot always owes the consumer one sync.
    has_pending_updates: AtomicBool,
    /// Per-id locks so concurrent lazy backfills coalesce into one fetch.
    backfill_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            users: DashMap::new(),
            has_pending_updates: AtomicBool::new(true),
            backfill_locks: DashMap::new(),
        }
    }

    /// Consume the change feed. The single consumer of `events`; per-id
    /// ordering is whatever order the feed delivers.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<DirectoryEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::info!("Directory change feed closed");
    }

    /// Apply one change-feed event.
    pub async fn handle_event(&self, event: DirectoryEvent) {
        match event {
            DirectoryEvent::Upserted(uuid) => self.update_user(&uuid).await,
            DirectoryEvent::Removed(uuid) => {
                self.remove_user(&uuid);
            }
        }
    }

    /// Fetch, validate and swap in the record for `uuid`.
    ///
    /// A fetch failure is logged and the event skipped; the feed keeps
    /// going. An invalid candidate evicts any previously cached record.
    async fn update_user(&self, uuid: &str) {
        let candidate = match self.build_user(uuid).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::error!(uuid, error = %e, "Directory update failed, skipping event");
                return;
            }
        };

        match candidate {
            Some(user) => {
                let previous = self.users.insert(uuid.to_string(), Arc::new(user));
                if previous.is_none() {
                    tracing::debug!(uuid, "Created new directory user");
                } else {
                    tracing::debug!(uuid, "Updated existing directory user");
                }
                self.has_pending_updates.store(true, Ordering::Release);
            }
            None => {
                tracing::info!(uuid, "User cannot be processed due to constraints");
                self.remove_user(uuid);
            }
        }
    }

    /// Evict `uuid`. The pending flag is only set if an entry was removed,
    /// so a removal of an unknown id is a no-op.
    fn remove_user(&self, uuid: &str) -> bool {
        match self.users.remove(uuid) {
            Some((_, user)) => {
                tracing::info!(uuid, versioned_id = %user.versioned_id(), "Removed directory user");
                self.has_pending_updates.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Read both backing documents and construct a validated candidate.
    ///
    /// `Ok(None)` means the documents exist but fail the admission
    /// invariant (or are absent entirely).
    async fn build_user(&self, uuid: &str) -> Result<Option<GarminUser>, AppError> {
        let auth_details = match self.store.auth_details(uuid).await? {
            Some(details) => details,
            None => {
                tracing::warn!(uuid, "No auth-detail document, skipping");
                return Ok(None);
            }
        };
        if auth_details.oauth_credentials.is_none() {
            tracing::warn!(uuid, "Auth-detail document carries no resource token, skipping");
            return Ok(None);
        }

        let user_details = self.store.user_details(uuid).await?.unwrap_or_default();

        let user = GarminUser {
            uuid: uuid.to_string(),
            user_details,
            auth_details,
        };

        Ok(user.is_valid().then_some(user))
    }

    /// Look up a user, lazily backfilling from the document store on a
    /// cache miss. Concurrent callers for the same id share one fetch and
    /// observe the same outcome.
    pub async fn get(&self, uuid: &str) -> Result<Option<Arc<GarminUser>>, AppError> {
        if let Some(user) = self.users.get(uuid) {
            return Ok(Some(user.clone()));
        }

        let lock = self
            .backfill_locks
            .entry(uuid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring: another task may have backfilled.
        if let Some(user) = self.users.get(uuid) {
            return Ok(Some(user.clone()));
        }

        tracing::debug!(uuid, "Directory cache miss, backfilling from store");
        let user = match self.build_user(uuid).await? {
            Some(user) => Arc::new(user),
            None => return Ok(None),
        };
        self.users.insert(uuid.to_string(), user.clone());
        Ok(Some(user))
    }

    /// Snapshot of all cached users.
    pub fn users(&self) -> Vec<Arc<GarminUser>> {
        self.users.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Find a cached user by the vendor-side service user id.
    pub fn find_by_external_id(&self, service_user_id: &str) -> Option<Arc<GarminUser>> {
        self.users
            .iter()
            .find(|entry| entry.value().external_id() == service_user_id)
            .map(|entry| entry.value().clone())
    }

    /// Resolve the backing document id for a vendor-side service user id.
    pub fn document_id_by_external_id(&self, service_user_id: &str) -> Result<String, AppError> {
        self.find_by_external_id(service_user_id)
            .map(|user| user.uuid.clone())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No directory document for service user {service_user_id}"
                ))
            })
    }

    pub fn has_pending_updates(&self) -> bool {
        self.has_pending_updates.load(Ordering::Acquire)
    }

    /// Drain the pending-updates flag.
    ///
    /// Not idempotent: callers must check [`Self::has_pending_updates`]
    /// first, and concurrent drains must be serialized externally. The
    /// atomic exchange makes a lost race surface as an error rather than a
    /// silent double drain.
    pub fn apply_updates(&self) -> Result<(), AppError> {
        self.has_pending_updates
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                AppError::IllegalState(
                    "No pending updates available. Check hasPendingUpdates before draining"
                        .to_string(),
                )
            })
    }

    /// Remove the backing document and evict the cached record.
    pub async fn delete_user(&self, uuid: &str) -> Result<(), AppError> {
        self.store.delete_auth_details(uuid).await?;
        self.remove_user(uuid);
        Ok(())
    }
}
