//! # Salon-Sync Service
//!
//! Binary entry point for the salon-sync HTTP service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging and metrics
//! - Connects the datastore and wires the webhook pipeline
//! - Starts the HTTP server from salon-sync-api

use anyhow::Context;
use salon_sync_api::{
    build_webhook_processor, start_server, LoggingConfig, ServiceConfig, ServiceMetrics,
};
use salon_sync_core::{DataStore, InMemoryStore, PostgrestStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for configuration problems
const EXIT_CONFIGURATION: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources, later ones override earlier ones:
    //  1. /etc/salon-sync/service.yaml
    //  2. ./config/service.yaml
    //  3. File named by SALON_SYNC_CONFIG_FILE
    //  4. SALON_SYNC__SECTION__KEY environment variables
    //
    // Logging is set up from whatever loaded so that a load failure is
    // still reported through the subscriber.
    // -------------------------------------------------------------------------
    let loaded = ServiceConfig::load(None);
    init_logging(
        loaded
            .as_ref()
            .map(|c| &c.logging)
            .unwrap_or(&LoggingConfig::default()),
    );

    info!("Starting Salon-Sync Service");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };
    if let Err(e) = config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(EXIT_CONFIGURATION);
    }

    // -------------------------------------------------------------------------
    // Datastore
    //
    // Without a datastore URL the service runs against the in-memory store.
    // Rows are lost on restart, which is only useful for local testing.
    // -------------------------------------------------------------------------
    let store: Arc<dyn DataStore> = match config.datastore.postgrest_config() {
        Some(postgrest) => match PostgrestStore::new(postgrest) {
            Ok(store) => {
                info!(url = ?config.datastore.url, "Using PostgREST datastore");
                Arc::new(store)
            }
            Err(e) => {
                error!(error = %e, "Failed to create datastore client; aborting");
                std::process::exit(EXIT_CONFIGURATION);
            }
        },
        None => {
            warn!(
                "No datastore URL configured; using the in-memory store. \
                 Do not use in production."
            );
            Arc::new(InMemoryStore::new())
        }
    };

    let metrics = ServiceMetrics::new().context("failed to register service metrics")?;
    let processor = build_webhook_processor(&config, store.clone(), metrics.clone());

    info!(
        host = %config.server.host,
        port = config.server.port,
        router_path = %config.webhooks.router_path,
        strict_path = %config.webhooks.strict_path,
        signature_required = processor.requires_signature(),
        "Starting HTTP server"
    );

    if let Err(e) = start_server(config, Arc::new(processor), store, metrics).await {
        error!(error = %e, "Server terminated with an error");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let level = logging.level.to_lowercase();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "salon_sync_service={level},salon_sync_api={level},salon_sync_core={level},\
             wix_client={level},tower_http=debug"
        )
        .into()
    });

    let json = logging.json_format;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}
