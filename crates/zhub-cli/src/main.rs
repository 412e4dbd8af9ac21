//! zhub - Zigbee to MQTT gateway
//!
//! Runs the gateway against a ZNP coordinator, or inspects cluster schemas
//! offline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
#[cfg(feature = "serial")]
mod gateway;
mod tools;

use config::Config;

/// zhub - Zigbee to MQTT gateway
#[derive(Parser)]
#[command(name = "zhub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ZHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run {
        /// Serial device of the coordinator
        #[arg(short, long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(short, long)]
        baud_rate: Option<u32>,

        /// MQTT broker URL (mqtt://[user[:pass]@]host[:port])
        #[arg(short, long)]
        mqtt_url: Option<String>,

        /// Cluster schema file
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Decode a command payload against the schema
    Decode {
        /// Cluster name or id
        #[arg(long)]
        cluster: String,

        /// Command name or id
        #[arg(long)]
        command: String,

        /// Look the command up among the global commands
        #[arg(short, long)]
        global: bool,

        /// Cluster schema file
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Payload as hex
        hex: String,
    },

    /// Load a schema file and report what it defines
    CheckSchema {
        /// Schema file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            port,
            baud_rate,
            mqtt_url,
            schema,
        } => {
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baud_rate) = baud_rate {
                config.serial.baud_rate = baud_rate;
            }
            if let Some(url) = mqtt_url {
                config.mqtt.url = url;
            }
            if let Some(schema) = schema {
                config.zigbee.schema = schema;
            }
            config.validate()?;
            run_gateway(config).await?;
        }

        Commands::Decode {
            cluster,
            command,
            global,
            schema,
            hex,
        } => {
            let db = tools::load_schema(schema.as_deref().unwrap_or(&config.zigbee.schema))?;
            let data = tools::parse_hex(&hex)?;
            let value = tools::decode_command(&db, &cluster, &command, global, &data)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&value).context("Failed to format result")?
            );
        }

        Commands::CheckSchema { file } => match tools::load_schema(&file) {
            Ok(db) => {
                let summary = tools::summarize(&db);
                println!(
                    "{} {}: {} clusters, {} attributes, {} global commands, {} cluster commands",
                    "OK".green().bold(),
                    file.display(),
                    summary.clusters,
                    summary.attributes,
                    summary.global_commands,
                    summary.cluster_commands
                );
            }
            Err(e) => {
                println!("{} {:#}", "ERROR".red().bold(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

#[cfg(feature = "serial")]
async fn run_gateway(config: Config) -> Result<()> {
    use tokio::sync::mpsc;
    use tracing::info;

    let db = tools::load_schema(&config.zigbee.schema)?;

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    println!(
        "{} Starting gateway on {} @ {} baud",
        "zhub".cyan().bold(),
        config.serial.port,
        config.serial.baud_rate
    );
    gateway::run(config, db, &mut shutdown_rx).await
}

#[cfg(not(feature = "serial"))]
async fn run_gateway(_config: Config) -> Result<()> {
    anyhow::bail!("zhub was built without serial support; rebuild with --features serial")
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}
