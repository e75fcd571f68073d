//! SwitchCtl - Command line tool for inspecting a Switchyard coordinator
//!
//! Usage:
//!   switchctl status                  - Show coordinator and leadership status
//!   switchctl list brokers            - Show registered brokers
//!   switchctl deregister <unique-id>  - Deregister a broker
//!   switchctl report <leader-ip>      - Report the leader as unresponsive
//!   switchctl check-config            - Check a configuration file

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

/// Switchyard Coordinator Control Tool
#[derive(Parser)]
#[command(name = "switchctl")]
#[command(about = "Control and monitor a Switchyard coordinator", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/switchyard/switchyard.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show coordinator and leadership status
    Status,
    /// List registered resources
    List {
        #[command(subcommand)]
        what: ListSubcommand,
    },
    /// Deregister a broker by unique id
    Deregister {
        /// The broker's unique id
        unique_id: u32,
    },
    /// Report the current leader as unresponsive
    Report {
        /// The leader's private IP as seen by the reporting node
        leader_ip: String,
    },
    /// Check configuration file for errors
    CheckConfig {
        /// Path to config file to check (defaults to --config path)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ListSubcommand {
    /// List all brokers registered with the coordinator
    Brokers,
}

// ============ API Response Types ============

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct BrokerNode {
    #[serde(default)]
    unique_id: u32,
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    ip_address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    registered_at: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    healthy: bool,
    #[serde(default)]
    brokers: usize,
}

#[derive(Debug, Deserialize)]
struct FailoverResponse {
    outcome: String,
    #[serde(default)]
    new_leader_ip: Option<String>,
    #[serde(default)]
    notified_peers: Option<usize>,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = match &cli.endpoint {
        Some(e) => e.clone(),
        None => endpoint_from_config(&cli.config),
    };

    let result = match &cli.command {
        Commands::Status => show_status(&endpoint).await,
        Commands::List { what } => match what {
            ListSubcommand::Brokers => list_brokers(&endpoint).await,
        },
        Commands::Deregister { unique_id } => deregister(&endpoint, *unique_id).await,
        Commands::Report { leader_ip } => report_leader_down(&endpoint, leader_ip).await,
        Commands::CheckConfig { file } => {
            let config_path = file.clone().unwrap_or_else(|| cli.config.clone());
            check_config(&config_path)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn endpoint_from_config(path: &PathBuf) -> String {
    if path.exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(config) = toml::from_str::<Config>(&content) {
                let addr = config.api.bind_address;
                if addr.starts_with("0.0.0.0") {
                    return format!(
                        "http://127.0.0.1:{}",
                        addr.split(':').nth(1).unwrap_or("8080")
                    );
                }
                return format!("http://{}", addr);
            }
        }
    }
    "http://127.0.0.1:8080".to_string()
}

// ============ Commands ============

async fn show_status(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let health: HealthResponse = client
        .get(format!("{}/health", endpoint))
        .send()
        .await?
        .json()
        .await?;
    let elastic_ip: Option<String> = client
        .get(format!("{}/fetch-leadBroker-elasticIP", endpoint))
        .send()
        .await?
        .json()
        .await?;
    let leader_ip: Option<String> = client
        .get(format!("{}/getCurrent-leadBroker-PrivateIP", endpoint))
        .send()
        .await?
        .json()
        .await?;

    println!();
    println!("Coordinator Status");
    println!("==================");
    println!();
    println!("Healthy:           {}", health.healthy);
    println!("Brokers:           {}", health.brokers);
    println!(
        "Elastic IP:        {}",
        elastic_ip.as_deref().unwrap_or("NONE")
    );
    println!(
        "Leader private IP: {}",
        leader_ip.as_deref().unwrap_or("NONE")
    );
    println!();

    Ok(())
}

async fn list_brokers(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/broker-registry", endpoint))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }
    let registry: HashMap<u32, BrokerNode> = response.json().await?;

    let leader_ip: Option<String> = client
        .get(format!("{}/getCurrent-leadBroker-PrivateIP", endpoint))
        .send()
        .await?
        .json()
        .await?;

    println!();
    println!("Switchyard Broker Registry (switchctl v{})", env!("CARGO_PKG_VERSION"));
    println!("==========================================");
    println!();

    println!(
        "{:<12} {:<22} {:<18} {:<8} {:<8}",
        "UNIQUE ID", "INSTANCE", "PRIVATE IP", "PORT", "ROLE"
    );
    println!("{}", "-".repeat(70));

    let mut brokers: Vec<&BrokerNode> = registry.values().collect();
    brokers.sort_by_key(|b| b.unique_id);

    for broker in brokers {
        let role = if leader_ip.as_deref() == Some(broker.ip_address.as_str()) {
            "\x1b[1;34mLEADER\x1b[0m"
        } else {
            "peer"
        };
        println!(
            "{:<12} {:<22} {:<18} {:<8} {}",
            broker.unique_id, broker.instance_id, broker.ip_address, broker.port, role
        );
    }
    println!();

    Ok(())
}

async fn deregister(endpoint: &str, unique_id: u32) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{}/deregister-broker/{}", endpoint, unique_id))
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        println!("Broker {} is not registered", unique_id);
        return Ok(());
    }
    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    println!("Broker {} deregistered", unique_id);
    Ok(())
}

async fn report_leader_down(
    endpoint: &str,
    leader_ip: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/leader-not-responding", endpoint))
        .json(&serde_json::json!({ "currleadBrokerIPAtNode": leader_ip }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    let result: FailoverResponse = response.json().await?;
    match result.outcome.as_str() {
        "stale-report" => println!("Report was stale; leadership has already moved on."),
        "leader-alive" => println!("Leader answered its health probe; no action taken."),
        "unresolved-leader" => {
            println!("Leader confirmed down but could not be resolved to a broker.")
        }
        "failed-over" => {
            match result.new_leader_ip {
                Some(ip) => println!("Failover complete. New leader: {}", ip),
                None => println!("Failover complete. No brokers remain."),
            }
            if let Some(n) = result.notified_peers {
                println!("Notified {} peer(s).", n);
            }
        }
        other => println!("Unexpected outcome: {}", other),
    }

    Ok(())
}

// ============ Config Check ============

fn check_config(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("Switchyard Configuration Check");
    println!("==============================");
    println!();

    if !path.exists() {
        println!("\x1b[1;31m✗ ERROR:\x1b[0m Config file not found: {}", path.display());
        return Ok(());
    }
    println!("\x1b[1;32m✓\x1b[0m Config file: {}", path.display());

    let content = std::fs::read_to_string(path)?;
    match switchyard::SwitchyardConfig::from_str(&content) {
        Ok(config) => {
            println!("\x1b[1;32m✓\x1b[0m Config file is valid TOML");
            println!("\x1b[1;32m✓\x1b[0m Cloud provider: {}", config.cloud.provider);
            if let Some(endpoint) = &config.cloud.endpoint {
                println!("\x1b[1;32m✓\x1b[0m Cloud endpoint: {}", endpoint);
            }
            println!("\x1b[1;32m✓\x1b[0m API address: {}", config.api.bind_address);
            println!();
            println!("\x1b[1;32m✓ Configuration looks good!\x1b[0m");
        }
        Err(e) => {
            println!("\x1b[1;31m✗ ERROR:\x1b[0m {}", e);
            println!();
            println!("\x1b[1;31mConfiguration has errors that must be fixed!\x1b[0m");
        }
    }
    println!();

    Ok(())
}
