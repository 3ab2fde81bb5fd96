// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Host Server
//!
//! Starts agents, hands them to other hosts when they ask to move, and takes in agents other
//! hosts send over. Each agent gets its own ephemeral-port binding.
//!
//! | Command | Parameters | Reply |
//! |---------|------------|-------|
//! | `GET /` | | redirect to a newly created agent |
//! | `GET /status` | | HTML list of hosted agents |
//! | `Migrate` | `name`, `count`, `contents`, `peer`, `former` | new agent address |
//! | `HostAgent` | `name`, `count`, `contents`, `peer`, `former` | new agent address |
//!
//! `Migrate` comes from one of this host's own agents; `HostAgent` comes from the host the
//! agent is leaving (possibly this one).

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::agent_server::{snapshot_from_params, snapshot_query, AgentLinks, AgentServer};
use crate::application::behavior::{Behavior, Reply};
use crate::application::directory_client::DirectoryClient;
use crate::domain::address::Address;
use crate::domain::agent::{AgentName, AgentSnapshot, AgentState};
use crate::domain::error::{FleetError, FleetResult};
use crate::domain::fleet_config::FleetConfig;
use crate::infrastructure::listener::{Binding, BoundListener};
use crate::infrastructure::transport::{Transport, TransportError};
use crate::infrastructure::wire::{Params, Request, Response};
use crate::presentation::pages;

#[derive(Clone)]
struct HostedAgent {
    agent: Arc<AgentServer>,
    binding: Arc<Binding>,
}

pub struct HostServer {
    address: Address,
    bind_address: String,
    advertise_host: String,
    directory: DirectoryClient,
    transport: Transport,
    started_at: DateTime<Utc>,
    hosted: Mutex<HashMap<AgentName, HostedAgent>>,
    /// Bindings of agents that moved away; they serve one redirect and close.
    vacated: Mutex<Vec<Arc<Binding>>>,
}

impl HostServer {
    /// Bind the configured host port, start serving and announce this host to the directory.
    ///
    /// Registration is attempted once; a failure is logged and the host keeps running.
    pub async fn start(config: &FleetConfig) -> anyhow::Result<(Arc<Self>, Arc<Binding>)> {
        let network = &config.spec.network;
        let directory_address = config.directory_address()?;
        let transport = Transport::new(config.call_timeout());

        let bound = BoundListener::bind(&network.bind_address, network.host_port, &network.advertise_host)
            .await
            .with_context(|| format!("Failed to start host server on port {}", network.host_port))?;

        let host = Arc::new(Self {
            address: bound.address().clone(),
            bind_address: network.bind_address.clone(),
            advertise_host: network.advertise_host.clone(),
            directory: DirectoryClient::new(directory_address, transport.clone()),
            transport: transport.clone(),
            started_at: Utc::now(),
            hosted: Mutex::new(HashMap::new()),
            vacated: Mutex::new(Vec::new()),
        });
        let binding = bound.serve(Behavior::Host(Arc::clone(&host)), transport);
        info!(address = %host.address, directory = %host.directory.address(), "Host server started");

        if let Err(e) = host.directory.register_host_server(&host.address).await {
            warn!(
                directory = %host.directory.address(),
                error = %e,
                "Could not register with directory; agents can still be created here"
            );
        }
        Ok((host, binding))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn handle(&self, request: &Request) -> FleetResult<Reply> {
        if request.is_favicon() {
            return Err(FleetError::NotFound(request.path.clone()));
        }
        if request.is_command("GET") {
            return match request.path.as_str() {
                "/" => {
                    let address = self.create_agent().await?;
                    Ok(Reply::from(pages::redirect_response(address.url())))
                }
                "/status" | "/index.html" => Ok(Reply::from(Response::html(
                    200,
                    pages::host_status(&self.address, self.started_at, &self.hosted_agents()),
                ))),
                other => Err(FleetError::NotFound(format!("no page at '{}'", other))),
            };
        }

        let address = if request.is_command("Migrate") {
            self.migrate(&request.params).await?
        } else if request.is_command("HostAgent") {
            self.host_agent(&request.params).await?
        } else {
            return Err(FleetError::bad_request(format!(
                "Invalid request for this server: {}",
                request.command
            )));
        };
        Ok(Reply::from(Response::text(address.to_string())))
    }

    /// Start a brand-new agent, register it and splice it into the ring.
    pub async fn create_agent(&self) -> FleetResult<Address> {
        let bound = self.bind_agent_port().await?;
        let address = bound.address().clone();
        let registration = self.directory.register_new_agent(&address).await?;

        let agent = Arc::new(AgentServer::new(
            AgentState::new(registration.name.clone()),
            address.clone(),
            self.agent_links(),
        ));
        self.launch(bound, Arc::clone(&agent));
        metrics::counter!("ferry_agents_created_total").increment(1);
        info!(agent = %registration.name, %address, anchor = %registration.anchor, "Agent created");

        if let Err(e) = agent.join_ring(&registration.anchor).await {
            warn!(agent = %registration.name, anchor = %registration.anchor, error = %e, "Agent could not join the ring");
        }
        Ok(address)
    }

    /// Relocate one of this host's agents to a randomly chosen host.
    ///
    /// The agent is dropped from the local table first and put back if the receiving host
    /// refuses, so the caller can stay active. If the receiving host gives no usable answer the
    /// agent is not put back and the caller gets [`FleetError::Unconfirmed`]. Once the receiving
    /// host has the agent, a failed directory update is only logged.
    pub async fn migrate(&self, params: &Params) -> FleetResult<Address> {
        let snapshot = snapshot_from_params(params)?;
        let name = snapshot.state.name.clone();
        let released = self.hosted.lock().remove(&name);
        if released.is_none() {
            warn!(agent = %name, "Migration requested for an agent this host does not track");
        }

        let target = self.pick_target().await;
        info!(agent = %name, %target, "Relocating agent");

        match self.send_to_host(&target, &snapshot).await {
            Ok(new_address) => {
                metrics::counter!("ferry_migrations_total", "outcome" => "success").increment(1);
                if let Some(entry) = released {
                    self.vacated.lock().push(entry.binding);
                }
                if let Err(e) = self.directory.migrate(&name, &new_address).await {
                    warn!(agent = %name, to = %new_address, error = %e, "Directory not told about migration");
                }
                Ok(new_address)
            }
            Err(FleetError::Unconfirmed(detail)) => {
                metrics::counter!("ferry_migrations_total", "outcome" => "unconfirmed").increment(1);
                warn!(agent = %name, %target, error = %detail, "Handoff unconfirmed, agent not put back");
                if let Some(entry) = released {
                    self.vacated.lock().push(entry.binding);
                }
                Err(FleetError::Unconfirmed(format!(
                    "handoff of agent {} to {} unconfirmed: {}",
                    name, target, detail
                )))
            }
            Err(err) => {
                metrics::counter!("ferry_migrations_total", "outcome" => "failed").increment(1);
                if let Some(entry) = released {
                    self.hosted.lock().insert(name.clone(), entry);
                }
                Err(FleetError::Unavailable(format!(
                    "could not hand agent {} to {}: {}",
                    name,
                    target,
                    err.detail()
                )))
            }
        }
    }

    /// Take in an agent sent by another host and relink the ring around it.
    pub async fn host_agent(&self, params: &Params) -> FleetResult<Address> {
        let snapshot = snapshot_from_params(params)?;
        let old = snapshot.former_address.clone();
        let name = snapshot.state.name.clone();

        let bound = self.bind_agent_port().await?;
        let address = bound.address().clone();
        let agent = Arc::new(AgentServer::restore(
            snapshot,
            address.clone(),
            self.agent_links(),
        ));
        self.launch(bound, Arc::clone(&agent));
        agent.start_relink(&old);

        metrics::counter!("ferry_agents_hosted_total").increment(1);
        info!(agent = %name, from = %old, %address, "Agent hosted");
        Ok(address)
    }

    /// Agents currently served here, ordered by address.
    pub fn hosted_agents(&self) -> Vec<(AgentName, Address)> {
        let mut agents: Vec<_> = self
            .hosted
            .lock()
            .iter()
            .map(|(name, hosted)| (name.clone(), hosted.agent.address().clone()))
            .collect();
        agents.sort_by(|a, b| a.1.cmp(&b.1));
        agents
    }

    pub fn agent(&self, name: &AgentName) -> Option<Arc<AgentServer>> {
        self.hosted.lock().get(name).map(|h| Arc::clone(&h.agent))
    }

    /// Close every agent binding this host opened, including vacated ones.
    pub async fn shutdown_agents(&self) {
        let bindings: Vec<Arc<Binding>> = {
            let hosted = self.hosted.lock();
            let mut vacated = self.vacated.lock();
            hosted
                .values()
                .map(|h| Arc::clone(&h.binding))
                .chain(vacated.drain(..))
                .collect()
        };
        for binding in &bindings {
            binding.shutdown().await;
        }
        info!(address = %self.address, closed = bindings.len(), "Agent bindings shut down");
    }

    fn agent_links(&self) -> AgentLinks {
        AgentLinks {
            host: self.address.clone(),
            directory: self.directory.clone(),
            transport: self.transport.clone(),
        }
    }

    async fn bind_agent_port(&self) -> FleetResult<BoundListener> {
        BoundListener::bind(&self.bind_address, 0, &self.advertise_host)
            .await
            .map_err(|e| FleetError::Internal(e.to_string()))
    }

    fn launch(&self, bound: BoundListener, agent: Arc<AgentServer>) {
        let binding = bound.serve(Behavior::Agent(Arc::clone(&agent)), self.transport.clone());
        self.hosted
            .lock()
            .insert(agent.name().clone(), HostedAgent { agent, binding });
    }

    async fn pick_target(&self) -> Address {
        match self.directory.query_host_servers().await {
            Ok(hosts) => hosts
                .choose(&mut rand::rng())
                .cloned()
                .unwrap_or_else(|| self.address.clone()),
            Err(e) => {
                warn!(error = %e, "Could not list host servers, keeping agent on this host");
                self.address.clone()
            }
        }
    }

    async fn send_to_host(&self, target: &Address, snapshot: &AgentSnapshot) -> FleetResult<Address> {
        let request = Request::new("HostAgent", snapshot_query(snapshot)).with_host(target);
        let response = self.transport.call_ok(target, &request).await.map_err(|err| match err {
            TransportError::Connect { .. } | TransportError::Status { .. } => FleetError::from(err),
            _ => FleetError::Unconfirmed(err.to_string()),
        })?;
        response
            .body
            .trim()
            .parse()
            .map_err(|e| FleetError::Unconfirmed(format!("host {} sent a bad address: {}", target, e)))
    }
}

impl std::fmt::Debug for HostServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServer")
            .field("address", &self.address)
            .field("directory", self.directory.address())
            .field("hosted", &self.hosted.lock().len())
            .finish()
    }
}

impl std::fmt::Debug for HostedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAgent")
            .field("agent", &self.agent)
            .field("binding", &self.binding)
            .finish()
    }
}
