// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! The four endpoint kinds a binding can serve, plus the typed directory client they use.
//!
//! | Module | Endpoint |
//! |--------|----------|
//! | [`directory_service`] | Directory ("name server") |
//! | [`host_server`] | Host server: creates, ships and receives agents |
//! | [`agent_server`] | One agent and its place in the replication ring |
//! | [`zombie`] | Forwarding stub left behind by a migration |
//! | [`behavior`] | Dispatch from a binding to the endpoint it currently serves |

pub mod agent_server;
pub mod behavior;
pub mod directory_client;
pub mod directory_service;
pub mod host_server;
pub mod zombie;

pub use agent_server::AgentServer;
pub use behavior::{Behavior, Disposition, Reply};
pub use directory_client::DirectoryClient;
pub use directory_service::DirectoryService;
pub use host_server::HostServer;
pub use zombie::Zombie;
