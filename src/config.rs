//! Application configuration loaded from environment variables.
//!
//! Secrets (the Garmin consumer key pair) are read once at startup and held
//! in memory for the lifetime of the process.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// GCP project ID hosting the Firestore user directory
    pub gcp_project_id: String,
    /// Firestore collection holding user profile documents
    pub user_collection: String,
    /// Firestore collection holding Garmin auth-detail documents
    pub garmin_collection: String,
    /// Kafka bootstrap servers for the admin client
    pub kafka_bootstrap_servers: String,
    /// Management portal base URL (token key endpoint lives under it)
    pub management_portal_url: String,
    /// OAuth resource name this gateway accepts tokens for
    pub jwt_resource_name: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Garmin OAuth1 consumer key (process-wide, not per-user)
    pub garmin_consumer_key: String,
    /// Garmin OAuth1 consumer secret
    pub garmin_consumer_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            user_collection: "users".to_string(),
            garmin_collection: "garmin".to_string(),
            kafka_bootstrap_servers: "localhost:9092".to_string(),
            management_portal_url: "http://localhost:8080/managementportal".to_string(),
            jwt_resource_name: "res_gateway".to_string(),
            port: 8090,
            garmin_consumer_key: "test_consumer_key".to_string(),
            garmin_consumer_secret: "test_consumer_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// For local development, secrets can be set via a `.env` file. In
    /// production they are injected as environment variables by the
    /// deployment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            user_collection: env::var("FIRESTORE_USER_COLLECTION")
                .unwrap_or_else(|_| "users".to_string()),
            garmin_collection: env::var("FIRESTORE_GARMIN_COLLECTION")
                .unwrap_or_else(|_| "garmin".to_string()),
            kafka_bootstrap_servers: env::var("KAFKA_BOOTSTRAP_SERVERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            management_portal_url: env::var("MANAGEMENT_PORTAL_URL")
                .map_err(|_| ConfigError::Missing("MANAGEMENT_PORTAL_URL"))?,
            jwt_resource_name: env::var("JWT_RESOURCE_NAME")
                .unwrap_or_else(|_| "res_gateway".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .unwrap_or(8090),

            garmin_consumer_key: env::var("GARMIN_CONSUMER_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GARMIN_CONSUMER_KEY"))?,
            garmin_consumer_secret: env::var("GARMIN_CONSUMER_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GARMIN_CONSUMER_SECRET"))?,
        })
    }

    /// Token key endpoint on the management portal.
    pub fn token_key_url(&self) -> String {
        format!(
            "{}/oauth/token_key",
            self.management_portal_url.trim_end_matches('/')
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
