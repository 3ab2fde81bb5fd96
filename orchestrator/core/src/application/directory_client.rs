// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tracing::debug;

use crate::domain::address::Address;
use crate::domain::agent::AgentName;
use crate::domain::directory::Registration;
use crate::domain::error::{FleetError, FleetResult};
use crate::infrastructure::transport::{Transport, TransportError};
use crate::infrastructure::wire::{encode_pairs, Request};

/// Typed calls against a remote directory service.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    address: Address,
    transport: Transport,
}

impl DirectoryClient {
    pub fn new(address: Address, transport: Transport) -> Self {
        Self { address, transport }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    async fn call(&self, command: &str, pairs: &[(&str, &str)]) -> FleetResult<String> {
        let request = Request::new(command, encode_pairs(pairs.iter().copied())).with_host(&self.address);
        match self.transport.call_ok(&self.address, &request).await {
            Ok(response) => Ok(response.body),
            Err(TransportError::Status { status: 404, detail, .. }) => Err(FleetError::NotFound(detail)),
            Err(TransportError::Status { status: 400, detail, .. }) => Err(FleetError::BadRequest(detail)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn register_host_server(&self, server: &Address) -> FleetResult<()> {
        let server = server.to_string();
        self.call("RegisterHostServer", &[("server", server.as_str())])
            .await
            .map(|_| ())
    }

    pub async fn query_host_servers(&self) -> FleetResult<Vec<Address>> {
        let body = self.call("QueryHostServers", &[]).await?;
        body.trim()
            .split('&')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse()
                    .map_err(|e| FleetError::Internal(format!("directory returned bad host '{}': {}", s, e)))
            })
            .collect()
    }

    pub async fn register_new_agent(&self, server: &Address) -> FleetResult<Registration> {
        let server = server.to_string();
        let body = self.call("RegisterNewAgent", &[("server", server.as_str())]).await?;
        let malformed = || FleetError::Internal(format!("malformed registration reply: '{}'", body));
        let (name, anchor) = body.trim().split_once('&').ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        let anchor = anchor.parse().map_err(|_| malformed())?;
        debug!(agent = name, %anchor, "Registered with directory");
        Ok(Registration {
            name: AgentName::from(name),
            anchor,
        })
    }

    pub async fn migrate(&self, name: &AgentName, server: &Address) -> FleetResult<()> {
        let server = server.to_string();
        self.call("Migrate", &[("name", name.as_str()), ("server", server.as_str())])
            .await
            .map(|_| ())
    }

    pub async fn lookup(&self, name: &AgentName) -> FleetResult<Address> {
        let body = self.call("Lookup", &[("name", name.as_str())]).await?;
        body.trim()
            .parse()
            .map_err(|e| FleetError::Internal(format!("directory returned bad address '{}': {}", body, e)))
    }

    /// The HTML manifest, as a browser would see it.
    pub async fn manifest(&self) -> FleetResult<String> {
        self.call("GET", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::directory_service::DirectoryService;
    use crate::domain::fleet_config::FleetConfig;

    async fn start_directory() -> (std::sync::Arc<crate::infrastructure::listener::Binding>, DirectoryClient) {
        let mut config = FleetConfig::default();
        config.spec.network.directory_port = 0;
        config.spec.network.advertise_host = "127.0.0.1".to_string();
        let (_, binding) = DirectoryService::start(&config).await.unwrap();
        let client = DirectoryClient::new(binding.address().clone(), Transport::default());
        (binding, client)
    }

    #[tokio::test]
    async fn test_client_round_trip_over_tcp() {
        let (_binding, client) = start_directory().await;
        client
            .register_host_server(&Address::new("localhost", 1565))
            .await
            .unwrap();
        assert_eq!(
            client.query_host_servers().await.unwrap(),
            vec![Address::new("localhost", 1565)]
        );

        let reg = client
            .register_new_agent(&Address::new("localhost", 3001))
            .await
            .unwrap();
        assert_eq!(reg.anchor, Address::new("localhost", 3001));
        client
            .migrate(&reg.name, &Address::new("localhost", 3009))
            .await
            .unwrap();
        assert_eq!(
            client.lookup(&reg.name).await.unwrap(),
            Address::new("localhost", 3009)
        );
        assert!(client.manifest().await.unwrap().contains(reg.name.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let (_binding, client) = start_directory().await;
        let err = client.lookup(&AgentName::from("ghost")).await.unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_host_list() {
        let (_binding, client) = start_directory().await;
        assert!(client.query_host_servers().await.unwrap().is_empty());
    }
}
