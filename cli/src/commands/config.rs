// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use ferry_core::domain::fleet_config::FleetConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./ferry-config.yaml)
        #[arg(short, long, default_value = "./ferry-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = FleetConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. FERRY_CONFIG_PATH: {}",
            std::env::var("FERRY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./ferry-config.yaml");
        println!("  4. ~/.ferry/config.yaml");
        println!("  5. /etc/ferry/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Fleet Member:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    let network = &config.spec.network;
    println!("{}", "Network:".bold());
    println!("  Bind address: {}", network.bind_address);
    println!("  Advertise host: {}", network.advertise_host);
    println!("  Directory port: {}", network.directory_port);
    println!("  Host port: {}", network.host_port);
    println!();

    println!("{}", "Directory:".bold());
    println!("  Address: {}", config.spec.directory.address);
    println!();

    println!("{}", "Timeouts:".bold());
    println!("  Call timeout: {:?}", config.call_timeout());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FleetConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            output.display()
        );
    }

    FleetConfig::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_writes_a_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry-config.yaml");

        generate(&path, false).await.unwrap();
        let config = FleetConfig::from_yaml_file(&path).unwrap();
        config.validate().unwrap();

        let err = generate(&path, false).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        generate(&path, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "apiVersion: ferry.dev/v1\nkind: NodeConfig\nmetadata:\n  name: test\nspec: {}\n",
        )
        .unwrap();

        let err = validate(Some(path)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid kind"));
    }
}
