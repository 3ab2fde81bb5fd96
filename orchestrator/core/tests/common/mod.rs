// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared setup for fleet integration tests: a directory and host servers on ephemeral
//! loopback ports.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use ferry_core::application::{AgentServer, DirectoryClient, DirectoryService, HostServer};
use ferry_core::domain::address::Address;
use ferry_core::domain::agent::AgentName;
use ferry_core::domain::fleet_config::FleetConfig;
use ferry_core::infrastructure::wire::{encode_pairs, read_request, Request, Response};
use ferry_core::infrastructure::{Binding, Transport};
use ferry_core::presentation::pages;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestFleet {
    pub directory: Arc<DirectoryService>,
    pub directory_address: Address,
    directory_endpoint: DirectoryEndpoint,
    pub hosts: Vec<Arc<HostServer>>,
    pub host_bindings: Vec<Arc<Binding>>,
    /// Client side of the tests; patient enough to wait out a whole migration.
    pub transport: Transport,
}

enum DirectoryEndpoint {
    Bound(Arc<Binding>),
    Scripted(ScriptedDirectory),
}

pub fn loopback_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.spec.network.bind_address = "127.0.0.1".to_string();
    config.spec.network.advertise_host = "127.0.0.1".to_string();
    config.spec.network.directory_port = 0;
    config.spec.network.host_port = 0;
    config.spec.timeouts.call_timeout = Duration::from_secs(2);
    config
}

impl TestFleet {
    pub async fn start(hosts: usize) -> Self {
        let config = loopback_config();
        let (directory, binding) = DirectoryService::start(&config).await.unwrap();
        let address = binding.address().clone();
        Self::with_hosts(config, directory, address, DirectoryEndpoint::Bound(binding), hosts).await
    }

    /// Same as [`TestFleet::start`], but the directory answers through `script`.
    pub async fn start_scripted(hosts: usize, call_timeout: Duration, script: DirectoryScript) -> Self {
        let mut config = loopback_config();
        config.spec.timeouts.call_timeout = call_timeout;
        let directory = Arc::new(DirectoryService::new());
        let scripted = ScriptedDirectory::start(Arc::clone(&directory), script).await;
        let address = scripted.address.clone();
        Self::with_hosts(config, directory, address, DirectoryEndpoint::Scripted(scripted), hosts).await
    }

    async fn with_hosts(
        mut config: FleetConfig,
        directory: Arc<DirectoryService>,
        directory_address: Address,
        directory_endpoint: DirectoryEndpoint,
        hosts: usize,
    ) -> Self {
        config.spec.directory.address = directory_address.to_string();
        let mut fleet = Self {
            directory,
            directory_address,
            directory_endpoint,
            hosts: Vec::new(),
            host_bindings: Vec::new(),
            transport: Transport::new(CLIENT_TIMEOUT),
        };
        for _ in 0..hosts {
            let (host, binding) = HostServer::start(&config).await.unwrap();
            fleet.hosts.push(host);
            fleet.host_bindings.push(binding);
        }
        fleet
    }

    pub fn directory_client(&self) -> DirectoryClient {
        DirectoryClient::new(self.directory_address.clone(), self.transport.clone())
    }

    /// Create an agent through the host's HTTP front door and return its address.
    pub async fn create_agent(&self, host: usize) -> Address {
        let response = get(&self.transport, self.hosts[host].address(), "").await;
        assert_eq!(response.status, 302, "host did not redirect: {}", response.body);
        response.location_address().unwrap()
    }

    /// The live agent currently known by `name`, wherever it is hosted.
    pub fn agent(&self, name: &AgentName) -> Option<Arc<AgentServer>> {
        self.hosts.iter().find_map(|host| host.agent(name))
    }

    /// How many hosts currently serve an agent called `name`.
    pub fn live_copies(&self, name: &AgentName) -> usize {
        self.hosts.iter().filter(|host| host.agent(name).is_some()).count()
    }

    pub fn name_at(&self, address: &Address) -> AgentName {
        self.directory
            .agents()
            .into_iter()
            .find(|(_, at)| at == address)
            .map(|(name, _)| name)
            .unwrap()
    }

    pub async fn shutdown(self) {
        for host in &self.hosts {
            host.shutdown_agents().await;
        }
        for binding in &self.host_bindings {
            binding.shutdown().await;
        }
        if let DirectoryEndpoint::Bound(binding) = &self.directory_endpoint {
            binding.shutdown().await;
        }
    }
}

/// How a [`ScriptedDirectory`] departs from a plain directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScript {
    /// Held before every answer.
    pub delay: Duration,
    /// Reported by `QueryHostServers` instead of the registered hosts.
    pub host_servers: Option<Vec<Address>>,
}

/// A directory endpoint that answers through a real [`DirectoryService`] but follows a script.
pub struct ScriptedDirectory {
    address: Address,
    task: JoinHandle<()>,
}

impl ScriptedDirectory {
    pub async fn start(service: Arc<DirectoryService>, script: DirectoryScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::new("127.0.0.1", listener.local_addr().unwrap().port());
        let script = Arc::new(script);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let service = Arc::clone(&service);
                let script = Arc::clone(&script);
                tokio::spawn(async move { answer(stream, &service, &script).await });
            }
        });
        Self { address, task }
    }
}

impl Drop for ScriptedDirectory {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer(stream: TcpStream, service: &DirectoryService, script: &DirectoryScript) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let Ok(request) = read_request(&mut reader).await else {
        return;
    };
    sleep(script.delay).await;

    let response = match &script.host_servers {
        Some(hosts) if request.is_command("QueryHostServers") => Response::text(
            hosts
                .iter()
                .map(Address::to_string)
                .collect::<Vec<_>>()
                .join("&"),
        ),
        _ => match service.handle(&request) {
            Ok(reply) => reply.response,
            Err(e) => pages::error_response(&e),
        },
    };
    let _ = write_half.write_all(response.encode().as_bytes()).await;
    let _ = write_half.shutdown().await;
}

/// An address nothing listens on.
pub async fn dead_address() -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Address::new("127.0.0.1", port)
}

/// A host that accepts connections and never answers.
pub struct SilentHost {
    pub address: Address,
    task: JoinHandle<()>,
}

impl SilentHost {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::new("127.0.0.1", listener.local_addr().unwrap().port());
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        Self { address, task }
    }
}

impl Drop for SilentHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn get(transport: &Transport, address: &Address, query: &str) -> Response {
    let request = Request::new("GET", query).with_host(address);
    transport.call(address, &request).await.unwrap()
}

pub fn update_query(key: &str, value: &str) -> String {
    encode_pairs([("input", key), ("value", value)])
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Wait until nothing accepts requests at `address` any more.
pub async fn wait_until_closed(transport: &Transport, address: &Address) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let request = Request::new("GET", "").with_host(address);
        if transport.call(address, &request).await.is_err() {
            return;
        }
        if Instant::now() > deadline {
            panic!("{} still serving after shutdown", address);
        }
        sleep(Duration::from_millis(20)).await;
    }
}
