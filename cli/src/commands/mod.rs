// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the ferry CLI

pub mod agent;
pub mod config;
pub mod directory_query;
pub mod serve;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::directory_query::DirectoryQueryCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;

use ferry_core::domain::fleet_config::FleetConfig;

/// Load, override and validate the configuration shared by every command.
pub fn load_config(config_path: Option<PathBuf>, bind: Option<&str>) -> Result<FleetConfig> {
    let mut config = FleetConfig::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(bind) = bind {
        config.spec.network.bind_address = bind.to_string();
    }
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}
