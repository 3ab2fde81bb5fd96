// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-only questions for a running directory

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use ferry_core::application::DirectoryClient;
use ferry_core::domain::agent::AgentName;
use ferry_core::domain::fleet_config::FleetConfig;
use ferry_core::infrastructure::Transport;

#[derive(Subcommand)]
pub enum DirectoryQueryCommand {
    /// List registered host servers
    Hosts,

    /// Print the current address of an agent
    Lookup {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Print the directory's HTML manifest
    Manifest,
}

pub async fn handle_command(command: DirectoryQueryCommand, config: &FleetConfig) -> Result<()> {
    let directory = DirectoryClient::new(
        config.directory_address()?,
        Transport::new(config.call_timeout()),
    );

    match command {
        DirectoryQueryCommand::Hosts => {
            let hosts = directory
                .query_host_servers()
                .await
                .with_context(|| format!("Failed to query directory at {}", directory.address()))?;
            if hosts.is_empty() {
                println!("{}", "No host servers registered".yellow());
            } else {
                println!("{}", format!("Host servers ({}):", hosts.len()).bold());
                for host in hosts {
                    println!("  {}", host);
                }
            }
        }
        DirectoryQueryCommand::Lookup { name } => {
            let address = directory
                .lookup(&AgentName::from(name.as_str()))
                .await
                .with_context(|| format!("Failed to look up agent '{}'", name))?;
            println!("{}", address);
        }
        DirectoryQueryCommand::Manifest => {
            let page = directory
                .manifest()
                .await
                .with_context(|| format!("Failed to fetch manifest from {}", directory.address()))?;
            println!("{}", page);
        }
    }
    Ok(())
}
