// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # ferry
//!
//! The `ferry` binary runs the pieces of an agent fleet and talks to them.
//!
//! ## Commands
//!
//! - `ferry directory` - Run the directory service
//! - `ferry host` - Run a host server
//! - `ferry fleet --hosts N` - Run a directory and N host servers in one process
//! - `ferry agent create|update|migrate|show` - Agent operations
//! - `ferry directory-query hosts|lookup|manifest` - Ask the directory
//! - `ferry config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use ferry::commands::{self, AgentCommand, ConfigCommand, DirectoryQueryCommand};

/// ferry - host stateful agents that can move between machines
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FERRY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Address to bind listeners on (overrides spec.network.bind_address)
    #[arg(long, global = true, env = "FERRY_BIND")]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FERRY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true, env = "FERRY_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the directory service
    #[command(name = "directory")]
    Directory {
        /// Listen port (default: spec.network.directory_port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a host server
    #[command(name = "host")]
    Host {
        /// Listen port (default: spec.network.host_port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory address, HOST:PORT (default: spec.directory.address)
        #[arg(short, long)]
        directory: Option<String>,
    },

    /// Run a directory and several host servers in this process
    #[command(name = "fleet")]
    Fleet {
        /// Number of host servers
        #[arg(long, default_value_t = 2)]
        hosts: usize,
    },

    /// Agent operations
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Query the directory service
    #[command(name = "directory-query")]
    DirectoryQuery {
        #[command(subcommand)]
        command: DirectoryQueryCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    if let Some(port) = cli.metrics_port {
        init_metrics(port)?;
    }

    match cli.command {
        Some(Commands::Directory { port }) => {
            let config = commands::load_config(cli.config, cli.bind.as_deref())?;
            commands::serve::run_directory(config, port).await
        }
        Some(Commands::Host { port, directory }) => {
            let config = commands::load_config(cli.config, cli.bind.as_deref())?;
            commands::serve::run_host(config, port, directory).await
        }
        Some(Commands::Fleet { hosts }) => {
            let config = commands::load_config(cli.config, cli.bind.as_deref())?;
            commands::serve::run_fleet(config, hosts).await
        }
        Some(Commands::Agent { command }) => {
            let config = commands::load_config(cli.config, cli.bind.as_deref())?;
            commands::agent::handle_command(command, &config).await
        }
        Some(Commands::DirectoryQuery { command }) => {
            let config = commands::load_config(cli.config, cli.bind.as_deref())?;
            commands::directory_query::handle_command(command, &config).await
        }
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

/// Install the Prometheus exporter with its own HTTP listener
fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics exporter on {}", addr))?;
    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}
