//! Switchyard - Broker Cluster Coordinator
//!
//! Coordinator daemon managing broker membership, leader election, and
//! elastic IP failover.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchyard::api::HttpServer;
use switchyard::cloud::{CloudProvider, HttpCloudProvider, MockCloudProvider};
use switchyard::config::SwitchyardConfig;
use switchyard::coordinator::Coordinator;
use switchyard::error::{Error, Result};
use switchyard::peers::HttpPeerTransport;

/// Switchyard - Broker Cluster Coordinator
#[derive(Parser)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "switchyard.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show coordinator information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the coordinator
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting Switchyard coordinator...");

    let config = match SwitchyardConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };

    let cloud: Arc<dyn CloudProvider> = match config.cloud.provider.as_str() {
        "mock" => {
            tracing::warn!("Using the in-memory mock cloud provider; no real cloud calls will be made");
            Arc::new(MockCloudProvider::new())
        }
        _ => {
            let endpoint = config
                .cloud
                .endpoint
                .clone()
                .ok_or_else(|| Error::Config("cloud.endpoint is required".into()))?;
            tracing::info!("Cloud control endpoint: {}", endpoint);
            Arc::new(HttpCloudProvider::new(
                endpoint,
                config.cloud.api_token.clone(),
                config.cloud_timeout(),
            )?)
        }
    };

    let peers = Arc::new(HttpPeerTransport::new(
        config.probe_timeout(),
        config.failover.probe_path.clone(),
        config.failover.notify_path.clone(),
    )?);

    let coordinator = Arc::new(Coordinator::new(cloud, peers, config.failover.clone()));
    let server = HttpServer::new(config.api.clone(), Arc::clone(&coordinator));

    tracing::info!("Coordinator ready, awaiting broker registrations");

    tokio::select! {
        result = server.start() => {
            if let Err(e) = &result {
                tracing::error!("HTTP server failed: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping coordinator");
            Ok(())
        }
    }
}

/// Initialize a new configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!(
            "{} already exists, refusing to overwrite",
            output.display()
        )));
    }

    let template = r#"# Switchyard coordinator configuration

[cloud]
# "http" talks to a cloud control endpoint; "mock" keeps everything in memory
provider = "http"
endpoint = "https://cloud-control.internal:9443"
# api_token = "..."
request_timeout_secs = 30

[failover]
probe_timeout_ms = 2000
probe_path = "/health"
notify_path = "/leader-changed"
default_broker_port = 8080

[api]
enabled = true
bind_address = "0.0.0.0:8080"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#;

    std::fs::write(&output, template)?;
    println!("Wrote {}", output.display());
    println!("Edit the [cloud] section before starting the coordinator.");
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match SwitchyardConfig::from_file(&config_path) {
        Ok(_) => {
            println!("Configuration {} is valid", config_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration {} is invalid: {}", config_path.display(), e);
            Err(e)
        }
    }
}

/// Show coordinator information
fn run_info(config_path: PathBuf) -> Result<()> {
    println!("Switchyard v{}", env!("CARGO_PKG_VERSION"));

    match SwitchyardConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Config:         {}", config_path.display());
            println!("Cloud provider: {}", config.cloud.provider);
            if let Some(endpoint) = &config.cloud.endpoint {
                println!("Cloud endpoint: {}", endpoint);
            }
            println!("API address:    {}", config.api.bind_address);
            println!("Probe timeout:  {}ms", config.failover.probe_timeout_ms);
        }
        Err(e) => {
            println!("Config:         {} (unreadable: {})", config_path.display(), e);
        }
    }
    Ok(())
}
