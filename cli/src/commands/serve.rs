// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running server commands: directory, host, fleet

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use ferry_core::application::{DirectoryService, HostServer};
use ferry_core::domain::address::Address;
use ferry_core::domain::fleet_config::FleetConfig;
use ferry_core::infrastructure::Binding;

pub async fn run_directory(mut config: FleetConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.spec.network.directory_port = port;
    }
    let (_, binding) = DirectoryService::start(&config).await?;
    println!(
        "{}",
        format!("✓ Directory listening on {}", binding.address()).green()
    );

    shutdown_signal().await;
    close_all(&[binding]).await;
    Ok(())
}

pub async fn run_host(mut config: FleetConfig, port: Option<u16>, directory: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.spec.network.host_port = port;
    }
    if let Some(directory) = directory {
        directory
            .parse::<Address>()
            .with_context(|| format!("Invalid directory address '{}'", directory))?;
        config.spec.directory.address = directory;
    }
    let (host, binding) = HostServer::start(&config).await?;
    println!(
        "{}",
        format!("✓ Host server listening on {}", host.address()).green()
    );
    println!("  Create an agent: {}", host.address().url());
    println!("  Status page:     {}status", host.address().url());

    shutdown_signal().await;
    host.shutdown_agents().await;
    close_all(&[binding]).await;
    Ok(())
}

pub async fn run_fleet(mut config: FleetConfig, hosts: usize) -> Result<()> {
    if hosts == 0 {
        anyhow::bail!("A fleet needs at least one host server");
    }
    let (_, directory) = DirectoryService::start(&config).await?;
    config.spec.directory.address = directory.address().to_string();
    println!(
        "{}",
        format!("✓ Directory listening on {}", directory.address()).green()
    );

    let mut bindings = vec![directory];
    let mut started = Vec::with_capacity(hosts);
    let base = config.spec.network.host_port;
    for i in 0..hosts {
        let mut host_config = config.clone();
        host_config.spec.network.host_port = host_port(base, i)?;
        let (host, binding) = HostServer::start(&host_config).await?;
        println!(
            "{}",
            format!("✓ Host server {} listening on {}", i + 1, host.address()).green()
        );
        bindings.push(binding);
        started.push(host);
    }

    shutdown_signal().await;
    for host in &started {
        host.shutdown_agents().await;
    }
    close_all(&bindings).await;
    Ok(())
}

/// Port for the `index`-th host of a fleet. A base of 0 keeps every host on an ephemeral port.
fn host_port(base: u16, index: usize) -> Result<u16> {
    if base == 0 {
        return Ok(0);
    }
    u16::try_from(index)
        .ok()
        .and_then(|i| base.checked_add(i))
        .with_context(|| format!("Host port {} + {} is out of range", base, index))
}

async fn close_all(bindings: &[Arc<Binding>]) {
    for binding in bindings {
        binding.shutdown().await;
    }
    info!("All listeners closed");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
