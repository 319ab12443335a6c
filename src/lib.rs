// SPDX-License-Identifier: MIT

//! Garmin-Gateway: relay Garmin Health push data into a Kafka backend.
//!
//! This crate provides the backend API that signs Garmin wellness API
//! requests with per-user OAuth1 credentials kept in sync from a Firestore
//! user directory, and exposes Kafka topic metadata through a cached HTTP
//! facade.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use middleware::TokenVerifier;
use services::directory::UserDirectory;
use services::garmin::GarminUserRepository;
use services::kafka::KafkaAdminService;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub directory: Arc<UserDirectory>,
    pub user_repository: Arc<GarminUserRepository>,
    pub kafka_admin: Arc<KafkaAdminService>,
    pub token_verifier: TokenVerifier,
}
