// SPDX-License-Identifier: MIT

//! Garmin-Gateway API Server
//!
//! Relays Garmin Health push data into Kafka. Keeps per-user OAuth1
//! credentials current from a Firestore user directory and serves cached
//! Kafka topic metadata.

use garmin_gateway::{
    config::Config,
    db::FirestoreDb,
    middleware::TokenVerifier,
    services::directory::UserDirectory,
    services::garmin::{GarminUserRepository, UserRepository},
    services::kafka::{KafkaAdminService, KafkaClusterAdmin},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the directory change-feed channel.
const DIRECTORY_EVENT_BUFFER: usize = 256;

/// How often the drain task checks for pending directory updates.
const DIRECTORY_SYNC_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Garmin-Gateway API");

    // Initialize Firestore database
    let db = FirestoreDb::new(
        &config.gcp_project_id,
        &config.user_collection,
        &config.garmin_collection,
    )
    .await
    .expect("Failed to connect to Firestore");

    // Directory snapshot fed by the Firestore change listener
    let directory = Arc::new(UserDirectory::new(Arc::new(db.clone())));
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(DIRECTORY_EVENT_BUFFER);
    let mut listener = db
        .listen_garmin_collection(event_tx)
        .await
        .expect("Failed to subscribe to user directory changes");
    tokio::spawn(directory.clone().run(event_rx));
    tracing::info!("User directory snapshot initialized");

    // Garmin credential repository
    let user_repository = Arc::new(GarminUserRepository::new(
        directory.clone(),
        config.garmin_consumer_key.clone(),
        config.garmin_consumer_secret.clone(),
    ));

    // Kafka topic metadata service
    let kafka_admin = Arc::new(KafkaAdminService::new(Arc::new(
        KafkaClusterAdmin::new(&config.kafka_bootstrap_servers)
            .expect("Failed to create Kafka admin client"),
    )));
    tracing::info!(
        bootstrap = %config.kafka_bootstrap_servers,
        "Kafka admin service initialized"
    );

    // Management portal token verifier
    let token_verifier =
        TokenVerifier::from_management_portal(&config.token_key_url(), &config.jwt_resource_name)
            .await
            .expect("Failed to fetch management portal token key");

    // Single scheduled drain task: pick up directory changes for the
    // downstream backfill scheduling.
    tokio::spawn(directory_sync_loop(user_repository.clone()));

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        directory,
        user_repository,
        kafka_admin,
        token_verifier,
    });

    // Build router
    let app = garmin_gateway::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let tcp_listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tear down the directory subscription before exiting.
    listener
        .shutdown()
        .await
        .unwrap_or_else(|e| tracing::warn!(error = %e, "Listener shutdown failed"));

    Ok(())
}

/// Periodically drain the directory's pending-updates flag.
///
/// The repository re-enumerates its users on every drain so the backfill
/// scheduling always works from the current user set.
async fn directory_sync_loop(repository: Arc<GarminUserRepository>) {
    let mut interval = tokio::time::interval(DIRECTORY_SYNC_INTERVAL);
    loop {
        interval.tick().await;
        if !repository.has_pending_updates() {
            continue;
        }
        let users = repository.list().await;
        match repository.apply_pending_updates() {
            Ok(()) => {
                tracing::info!(count = users.len(), "User directory synchronized");
            }
            Err(e) => {
                // Lost a race against another drain; nothing to do.
                tracing::warn!(error = %e, "Directory drain skipped");
            }
        }
    }
}

/// Resolve on SIGTERM/ctrl-c for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("garmin_gateway=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
