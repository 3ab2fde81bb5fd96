// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Directory Service
//!
//! The fleet's name server: knows every host server that announced itself and the current
//! address of every agent. It only answers; it never calls anyone.
//!
//! | Command | Parameters | Reply |
//! |---------|------------|-------|
//! | `GET` | | HTML manifest |
//! | `RegisterHostServer` | `server` | `success` |
//! | `QueryHostServers` | | `&`-joined host addresses |
//! | `RegisterNewAgent` | `server` | `name&anchor` |
//! | `Migrate` | `name`, `server` | `success` |
//! | `Lookup` | `name` | agent address |

use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::application::behavior::{Behavior, Reply};
use crate::domain::address::Address;
use crate::domain::agent::AgentName;
use crate::domain::directory::{Directory, Registration};
use crate::domain::error::{FleetError, FleetResult};
use crate::domain::fleet_config::FleetConfig;
use crate::infrastructure::listener::{Binding, BoundListener};
use crate::infrastructure::transport::Transport;
use crate::infrastructure::wire::{Request, Response};
use crate::presentation::pages;

pub const SUCCESS: &str = "success";

#[derive(Debug, Default)]
pub struct DirectoryService {
    directory: Mutex<Directory>,
}

impl DirectoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the configured directory port and start serving.
    pub async fn start(config: &FleetConfig) -> anyhow::Result<(Arc<Self>, Arc<Binding>)> {
        let network = &config.spec.network;
        let bound = BoundListener::bind(&network.bind_address, network.directory_port, &network.advertise_host)
            .await
            .with_context(|| format!("Failed to start directory on port {}", network.directory_port))?;
        let service = Arc::new(Self::new());
        let binding = bound.serve(
            Behavior::Directory(Arc::clone(&service)),
            Transport::new(config.call_timeout()),
        );
        info!(address = %binding.address(), "Directory service started");
        Ok((service, binding))
    }

    pub fn handle(&self, request: &Request) -> FleetResult<Reply> {
        let params = &request.params;
        let response = if request.is_command("GET") {
            if request.is_favicon() {
                return Err(FleetError::NotFound(request.path.clone()));
            }
            Response::html(200, self.manifest())
        } else if request.is_command("RegisterHostServer") {
            let server = params.require_address("server")?;
            self.register_host_server(server);
            Response::text(SUCCESS)
        } else if request.is_command("QueryHostServers") {
            let hosts = self.host_servers();
            Response::text(
                hosts
                    .iter()
                    .map(Address::to_string)
                    .collect::<Vec<_>>()
                    .join("&"),
            )
        } else if request.is_command("RegisterNewAgent") {
            let server = params.require_address("server")?;
            let reg = self.register_new_agent(server);
            Response::text(format!("{}&{}", reg.name, reg.anchor))
        } else if request.is_command("Migrate") {
            let name = AgentName::from(params.require("name")?);
            let server = params.require_address("server")?;
            self.migrate(name, server);
            Response::text(SUCCESS)
        } else if request.is_command("Lookup") {
            let name = AgentName::from(params.require("name")?);
            let address = self
                .lookup(&name)
                .ok_or_else(|| FleetError::NotFound(format!("no agent named '{}'", name)))?;
            Response::text(address.to_string())
        } else {
            return Err(FleetError::bad_request(format!(
                "Invalid request for this server: {}",
                request.command
            )));
        };
        Ok(Reply::from(response))
    }

    pub fn register_host_server(&self, server: Address) {
        info!(host_server = %server, "Host server registered");
        self.directory.lock().register_host_server(server);
    }

    pub fn host_servers(&self) -> Vec<Address> {
        self.directory.lock().host_servers().to_vec()
    }

    pub fn register_new_agent(&self, server: Address) -> Registration {
        let reg = self
            .directory
            .lock()
            .register_agent(server.clone(), AgentName::generate);
        info!(agent = %reg.name, address = %server, anchor = %reg.anchor, "Agent registered");
        reg
    }

    pub fn migrate(&self, name: AgentName, server: Address) {
        let previous = self.directory.lock().migrate(name.clone(), server.clone());
        match previous {
            Some(from) => info!(agent = %name, %from, to = %server, "Agent migrated"),
            None => info!(agent = %name, to = %server, "Migration for unknown agent recorded"),
        }
    }

    pub fn lookup(&self, name: &AgentName) -> Option<Address> {
        self.directory.lock().lookup(name).cloned()
    }

    pub fn agents(&self) -> Vec<(AgentName, Address)> {
        self.directory.lock().agents()
    }

    fn manifest(&self) -> String {
        let (hosts, agents) = {
            let directory = self.directory.lock();
            (directory.host_servers().to_vec(), directory.agents())
        };
        pages::manifest(&hosts, &agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, query: &str) -> Request {
        Request::new(command, query)
    }

    fn body(service: &DirectoryService, command: &str, query: &str) -> String {
        service.handle(&request(command, query)).unwrap().response.body
    }

    #[test]
    fn test_register_and_query_host_servers() {
        let service = DirectoryService::new();
        assert_eq!(body(&service, "RegisterHostServer", "server=localhost:1565"), SUCCESS);
        assert_eq!(body(&service, "registerhostserver", "server=localhost:1566"), SUCCESS);
        assert_eq!(
            body(&service, "QueryHostServers", ""),
            "localhost:1565&localhost:1566"
        );
    }

    #[test]
    fn test_register_new_agent_replies_name_and_anchor() {
        let service = DirectoryService::new();
        let first = body(&service, "RegisterNewAgent", "server=localhost:3001");
        let (name, anchor) = first.split_once('&').unwrap();
        assert_eq!(name.len(), 32);
        assert_eq!(anchor, "localhost:3001");

        let second = body(&service, "RegisterNewAgent", "server=localhost:3002");
        assert!(second.ends_with("&localhost:3001"));
    }

    #[test]
    fn test_missing_server_leaves_registry_unchanged() {
        let service = DirectoryService::new();
        let err = service.handle(&request("RegisterNewAgent", "")).unwrap_err();
        assert_eq!(err, FleetError::missing("server"));
        assert!(service.agents().is_empty());

        let err = service
            .handle(&request("RegisterNewAgent", "server=nonsense"))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(service.agents().is_empty());
    }

    #[test]
    fn test_migrate_and_lookup() {
        let service = DirectoryService::new();
        let reg = service.register_new_agent(Address::new("localhost", 3001));
        let query = format!("name={}&server=localhost:4001", reg.name);
        assert_eq!(body(&service, "Migrate", &query), SUCCESS);
        assert_eq!(
            body(&service, "Lookup", &format!("name={}", reg.name)),
            "localhost:4001"
        );

        let err = service.handle(&request("Lookup", "name=nobody")).unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = service.handle(&request("Migrate", "name=x")).unwrap_err();
        assert_eq!(err, FleetError::missing("server"));
    }

    #[test]
    fn test_manifest_and_unknown_command() {
        let service = DirectoryService::new();
        service.register_host_server(Address::new("localhost", 1565));
        let page = body(&service, "GET", "");
        assert!(page.contains("localhost:1565"));

        let err = service.handle(&request("Explode", "")).unwrap_err();
        assert!(matches!(err, FleetError::BadRequest(_)));
    }
}
