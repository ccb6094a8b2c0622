//! # Rift Agent
//!
//! Command-line entry point for cross-world traversal.

mod config;
mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rift_traversal::{
    Position, TraversalApi, TraversalConfig, TraversalDetails, TraversalService, WebSocketTransport,
    WorldTransport,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cross-world traversal agent
#[derive(Parser, Debug)]
#[command(name = "rift-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    World(WorldCommand),
    /// Cross between two in-process worlds
    Demo,
}

/// Commands run against a live world.
#[derive(Subcommand, Debug)]
enum WorldCommand {
    /// Print agent identity and configuration
    Status,
    /// Connect to a world and print its welcome
    Connect {
        /// World address; defaults to `default_world`
        url: Option<String>,
    },
    /// Connect and list the world's portals
    Discover {
        /// World address; defaults to `default_world`
        url: Option<String>,
    },
    /// Connect, discover, and step through a portal
    Enter {
        /// Portal to enter
        portal: String,
        /// World address; defaults to `default_world`
        url: Option<String>,
        /// Memory summary carried in the passport
        #[arg(long)]
        memory: Option<String>,
        /// Departure position as x,y,z
        #[arg(long, value_parser = parse_position)]
        position: Option<Position>,
        /// Reputation carried in the passport
        #[arg(long)]
        reputation: Option<f64>,
    },
}

fn parse_position(text: &str) -> Result<Position, String> {
    let coords: Vec<f64> = text
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;
    match coords.as_slice() {
        [x, y, z] => Ok(Position::new(*x, *y, *z)),
        _ => Err("expected x,y,z".to_string()),
    }
}

fn init_logging(config: &TraversalConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `command`, then drop the link whether or not it succeeded.
async fn run_world_command<T: WorldTransport>(
    service: &TraversalService<T>,
    command: WorldCommand,
) -> Result<()> {
    let outcome = match command {
        WorldCommand::Status => print_json(&service.status()),
        WorldCommand::Connect { url } => match service.connect(url.as_deref()).await {
            Ok(welcome) => print_json(&welcome),
            Err(e) => Err(e.into()),
        },
        WorldCommand::Discover { url } => discover(service, url.as_deref()).await,
        WorldCommand::Enter {
            portal,
            url,
            memory,
            position,
            reputation,
        } => {
            let details = TraversalDetails {
                position,
                inventory_hash: None,
                memory_summary: memory,
                reputation,
            };
            enter(service, url.as_deref(), &portal, details).await
        }
    };
    service.disconnect().await;
    outcome
}

async fn discover<T: WorldTransport>(service: &TraversalService<T>, url: Option<&str>) -> Result<()> {
    service.connect(url).await?;
    let portals = service.discover().await?;
    print_json(&portals)
}

async fn enter<T: WorldTransport>(
    service: &TraversalService<T>,
    url: Option<&str>,
    portal: &str,
    details: TraversalDetails,
) -> Result<()> {
    service.connect(url).await?;
    service.discover().await?;
    let result = service.enter(portal, details).await?;
    print_json(&result)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(args.config.as_deref())?;
    init_logging(&config)?;

    match args.command {
        Command::Demo => print_json(&demo::run(config).await?)?,
        Command::World(command) => {
            let service = TraversalService::new(config, WebSocketTransport::new())?;
            run_world_command(&service, command).await?;
        }
    }

    info!("Done");
    Ok(())
}
