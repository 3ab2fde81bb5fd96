// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use ferry_core::application::agent_server::RELOCATION_CALL_BUDGET;
use ferry_core::application::DirectoryClient;
use ferry_core::domain::address::Address;
use ferry_core::domain::agent::AgentName;
use ferry_core::domain::fleet_config::FleetConfig;
use ferry_core::infrastructure::transport::{summarize_body, Transport};
use ferry_core::infrastructure::wire::{encode_pairs, Request, Response};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Create a new agent on a host server
    Create {
        /// Host server, HOST:PORT (default: advertise host and spec.network.host_port)
        #[arg(long, value_name = "HOST:PORT")]
        host: Option<String>,
    },

    /// Set a key on an agent; the change is replicated around the ring
    Update {
        /// Agent address (HOST:PORT) or agent name
        #[arg(value_name = "AGENT")]
        agent: String,

        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE", default_value = "")]
        value: String,
    },

    /// Move an agent to a randomly chosen host server
    Migrate {
        /// Agent address (HOST:PORT) or agent name
        #[arg(value_name = "AGENT")]
        agent: String,
    },

    /// Print an agent's page
    Show {
        /// Agent address (HOST:PORT) or agent name
        #[arg(value_name = "AGENT")]
        agent: String,
    },
}

pub async fn handle_command(command: AgentCommand, config: &FleetConfig) -> Result<()> {
    let transport = Transport::new(config.call_timeout());
    match command {
        AgentCommand::Create { host } => create_agent(host, config, &transport).await,
        AgentCommand::Update { agent, key, value } => {
            let address = resolve_agent(&agent, config, &transport).await?;
            update_agent(&address, &key, &value, &transport).await
        }
        AgentCommand::Migrate { agent } => {
            let address = resolve_agent(&agent, config, &transport).await?;
            migrate_agent(&address, &transport).await
        }
        AgentCommand::Show { agent } => {
            let address = resolve_agent(&agent, config, &transport).await?;
            show_agent(&address, &transport).await
        }
    }
}

/// Accept either an address or an agent name; names are looked up in the directory.
async fn resolve_agent(agent: &str, config: &FleetConfig, transport: &Transport) -> Result<Address> {
    if let Ok(address) = agent.parse::<Address>() {
        return Ok(address);
    }
    let directory = DirectoryClient::new(config.directory_address()?, transport.clone());
    directory
        .lookup(&AgentName::from(agent))
        .await
        .with_context(|| format!("Failed to look up agent '{}'", agent))
}

async fn create_agent(host: Option<String>, config: &FleetConfig, transport: &Transport) -> Result<()> {
    let host = match host {
        Some(h) => h
            .parse::<Address>()
            .with_context(|| format!("Invalid host address '{}'", h))?,
        None => Address::new(
            config.spec.network.advertise_host.clone(),
            config.spec.network.host_port,
        ),
    };

    let response = send(transport, &host, Request::new("GET", "")).await?;
    let agent = expect_redirect(&host, &response)?;
    println!("{}", format!("✓ Agent created at {}", agent).green());
    println!("  Open {} in a browser to use it", agent.url());
    Ok(())
}

async fn update_agent(address: &Address, key: &str, value: &str, transport: &Transport) -> Result<()> {
    let query = encode_pairs([("input", key), ("value", value)]);
    let mut at = address.clone();
    let mut response = send(transport, &at, Request::new("GET", query.clone())).await?;
    if let Some(moved) = response.location_address().filter(|_| response.is_redirect()) {
        println!("{}", format!("Agent has moved to {}, following", moved).yellow());
        at = moved;
        response = send(transport, &at, Request::new("GET", query)).await?;
    }
    ensure_success(&at, &response)?;
    println!("{}", format!("✓ {} = {:?} on {}", key, value, at).green());
    Ok(())
}

async fn migrate_agent(address: &Address, transport: &Transport) -> Result<()> {
    // The agent waits on its host, which waits on the directory and the receiving host.
    let transport = Transport::new(transport.timeout() * (RELOCATION_CALL_BUDGET + 2));
    let query = encode_pairs([("input", "migrate")]);
    let response = send(&transport, address, Request::new("GET", query)).await?;
    let moved_to = expect_redirect(address, &response)?;
    println!(
        "{}",
        format!("✓ Agent moved from {} to {}", address, moved_to).green()
    );
    Ok(())
}

async fn show_agent(address: &Address, transport: &Transport) -> Result<()> {
    let response = send(transport, address, Request::new("GET", "")).await?;
    if let Some(moved) = response.location_address().filter(|_| response.is_redirect()) {
        println!("{}", format!("Agent has moved to {}", moved).yellow());
        return Ok(());
    }
    ensure_success(address, &response)?;
    println!("{}", response.body);
    Ok(())
}

async fn send(transport: &Transport, address: &Address, request: Request) -> Result<Response> {
    let request = request.with_host(address);
    transport
        .call(address, &request)
        .await
        .with_context(|| format!("Request to {} failed", address))
}

fn expect_redirect(from: &Address, response: &Response) -> Result<Address> {
    ensure_success_or_redirect(from, response)?;
    response
        .location_address()
        .filter(|_| response.is_redirect())
        .with_context(|| format!("{} did not answer with a redirect", from))
}

fn ensure_success(from: &Address, response: &Response) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} answered {}: {}",
            from,
            response.status,
            summarize_body(&response.body)
        )
    }
}

fn ensure_success_or_redirect(from: &Address, response: &Response) -> Result<()> {
    if response.is_redirect() {
        Ok(())
    } else {
        ensure_success(from, response)
    }
}
