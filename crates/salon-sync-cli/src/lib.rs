//! # Salon-Sync CLI
//!
//! Command-line interface for salon-sync operators.
//!
//! This module provides CLI commands for:
//! - Back-filling the datastore from the Wix query APIs
//! - Signing webhook payloads for manual replays
//! - Configuration validation
//! - Datastore connectivity checks

use clap::{CommandFactory, Parser, Subcommand};
use salon_sync_api::{ConfigError, ServiceConfig};
use salon_sync_core::{
    webhook::{signature::compute_signature, Sanitizer},
    BulkSync, DataStore, PostgrestStore, StoreError, SyncError, SyncReport,
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wix_client::{ApiError, WixClient, WixResource};

// ============================================================================
// CLI Structure
// ============================================================================

/// Salon-Sync CLI - Wix data reconciliation for the salon back end
#[derive(Parser)]
#[command(name = "salon-sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Wix data reconciliation for the salon back end")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SALON_SYNC_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Copy Wix records into the datastore
    Sync {
        /// Collection to sync
        #[arg(value_enum)]
        target: SyncTarget,

        /// Items requested per page, overriding `wix.page_size`
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=100))]
        page_size: Option<u32>,

        /// Output format for the run report
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the webhook signature for a payload file
    Sign {
        /// Shared webhook secret
        #[arg(short, long, env = "SALON_SYNC_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// Payload file, signed byte for byte
        file: PathBuf,

        /// Prefix the digest with `sha256=`
        #[arg(long)]
        prefixed: bool,
    },

    /// Validate configuration
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Check that the configured datastore answers
    Health,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Collections that can be synced
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SyncTarget {
    Bookings,
    Contacts,
    Orders,
    Products,
    /// Every collection, in order
    All,
}

impl SyncTarget {
    /// The single resource to sync, or `None` for all of them
    pub fn resource(self) -> Option<WixResource> {
        match self {
            Self::Bookings => Some(WixResource::Bookings),
            Self::Contacts => Some(WixResource::Contacts),
            Self::Orders => Some(WixResource::Orders),
            Self::Products => Some(WixResource::Products),
            Self::All => None,
        }
    }
}

/// Output format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),

    #[error("Wix API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {message}")]
    Serialization { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Sync(_) | Self::Store(_) | Self::Api(_) => 2,
            Self::Configuration(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Serialization { .. } => 6,
        }
    }
}

fn serialization_error(e: impl std::fmt::Display) -> CliError {
    CliError::Serialization {
        message: e.to_string(),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    initialize_logging(&cli)?;

    match cli.command {
        Commands::Sync {
            target,
            page_size,
            format,
        } => {
            let config = load_configuration(None, cli.config.as_deref())?;
            let reports = sync(&config, target, page_size).await?;
            println!("{}", render_sync_reports(&reports, &format)?);
            Ok(())
        }
        Commands::Sign {
            secret,
            file,
            prefixed,
        } => {
            let payload = std::fs::read(&file)?;
            println!("{}", sign_payload(&secret, &payload, prefixed)?);
            Ok(())
        }
        Commands::Config { file, show, format } => {
            let config = load_configuration(file.as_deref(), cli.config.as_deref())?;
            if show {
                println!("{}", render_config(&config, &format)?);
            } else {
                println!("Configuration is valid");
            }
            Ok(())
        }
        Commands::Health => {
            let config = load_configuration(None, cli.config.as_deref())?;
            check_datastore(&config).await?;
            println!("Datastore is reachable");
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "salon-sync",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so that command output on stdout stays parseable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level).map_err(|e| {
        CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        }
    })?;

    let json = cli.json_logs;
    // A subscriber may already be installed when running in-process
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init();
    Ok(())
}

/// Pick the configuration file to load.
///
/// A command-specific file wins over the global `--config`; without either
/// the per-user file is used when it exists.
pub fn resolve_config_path(file: Option<&Path>, global: Option<&Path>) -> Option<PathBuf> {
    file.or(global)
        .map(Path::to_path_buf)
        .or_else(|| user_config_path().filter(|path| path.is_file()))
}

/// `<config dir>/salon-sync/config.yaml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("salon-sync").join("config.yaml"))
}

/// Load and validate configuration from file or defaults
pub fn load_configuration(
    file: Option<&Path>,
    global: Option<&Path>,
) -> Result<ServiceConfig, CliError> {
    let path = resolve_config_path(file, global);
    info!(path = ?path, "Loading configuration");

    let config = ServiceConfig::load(path.as_deref())?;
    config.validate()?;
    Ok(config)
}

/// Render configuration; secrets are redacted by their serializer
pub fn render_config(config: &ServiceConfig, format: &ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(serialization_error),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(serialization_error),
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(serialization_error),
    }
}

/// Hex HMAC-SHA256 of `payload`, as sent in the signature header
pub fn sign_payload(secret: &str, payload: &[u8], prefixed: bool) -> Result<String, CliError> {
    if secret.is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "--secret".to_string(),
            message: "secret must not be empty".to_string(),
        });
    }

    let digest = compute_signature(secret, payload).map_err(|e| CliError::InvalidArgument {
        arg: "--secret".to_string(),
        message: e.to_string(),
    })?;
    Ok(if prefixed {
        format!("sha256={}", digest)
    } else {
        digest
    })
}

/// Run the bulk sync for `target` against the configured Wix site and datastore
pub async fn sync(
    config: &ServiceConfig,
    target: SyncTarget,
    page_size: Option<u32>,
) -> Result<Vec<(WixResource, SyncReport)>, CliError> {
    let postgrest = config
        .datastore
        .postgrest_config()
        .ok_or_else(|| ConfigError::Missing {
            key: "datastore.url".to_string(),
        })?;
    if config.wix.token.is_empty() {
        return Err(ConfigError::Missing {
            key: "wix.token".to_string(),
        }
        .into());
    }

    let store = Arc::new(PostgrestStore::new(postgrest)?);
    let client = Arc::new(WixClient::new(
        config.wix.client_config(),
        config.wix.token.expose_secret(),
    )?);

    let bulk_sync = BulkSync::new(client, store, config.datastore.tables.clone())
        .with_page_size(page_size.unwrap_or(config.wix.page_size))
        .with_sanitizer(Sanitizer::new(config.webhooks.max_string_length));

    let reports = match target.resource() {
        Some(resource) => vec![(resource, bulk_sync.run(resource).await?)],
        None => bulk_sync.run_all().await?,
    };
    Ok(reports)
}

#[derive(Serialize)]
struct ResourceReport<'a> {
    resource: &'a str,
    #[serde(flatten)]
    report: SyncReport,
}

/// Render per-resource sync reports
pub fn render_sync_reports(
    reports: &[(WixResource, SyncReport)],
    format: &OutputFormat,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(reports
            .iter()
            .map(|(resource, report)| format!("{}: {}", resource.as_str(), report))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let rows: Vec<ResourceReport<'_>> = reports
                .iter()
                .map(|(resource, report)| ResourceReport {
                    resource: resource.as_str(),
                    report: *report,
                })
                .collect();
            serde_json::to_string_pretty(&rows).map_err(serialization_error)
        }
    }
}

/// Probe the configured datastore
pub async fn check_datastore(config: &ServiceConfig) -> Result<(), CliError> {
    let postgrest = config
        .datastore
        .postgrest_config()
        .ok_or_else(|| ConfigError::Missing {
            key: "datastore.url".to_string(),
        })?;
    let store = PostgrestStore::new(postgrest)?;
    store.health_check().await?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
