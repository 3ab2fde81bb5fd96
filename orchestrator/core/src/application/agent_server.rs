// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Server
//!
//! Serves one agent: its page, client updates, migration requests, and the three ring
//! messages that keep every agent's contents in step.
//!
//! | Command | Parameters | Effect |
//! |---------|------------|--------|
//! | `GET` | | agent page |
//! | `GET` | `input`, `value` | update one key, start a `syncData` lap |
//! | `GET` | `input=migrate` | relocate through the host server, then become a zombie |
//! | `makePeer` | `peer` | splice the newcomer in after this agent, reply with the old successor |
//! | `syncData` | `origin`, `contents` | merge, pass on until the lap returns to `origin` |
//! | `syncPeer` | `new`, `old` | re-point whoever still links to `old`, pass on until `new` |
//!
//! State, ring peer and phase sit behind one mutex that is never held across a network call.
//! Ring messages are sent on spawned tasks so a handler never waits for a whole lap.
//!
//! Only an `Active` agent changes its cell. Updates and ring messages that arrive once a
//! migration has started get `503`; ring senders retry until the old address turns into a
//! zombie and then follow its redirect to the new copy.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::application::behavior::{Behavior, Reply};
use crate::application::directory_client::DirectoryClient;
use crate::application::zombie::Zombie;
use crate::domain::address::{Address, PeerLink};
use crate::domain::agent::{AgentName, AgentPhase, AgentSnapshot, AgentState};
use crate::domain::error::{FleetError, FleetResult};
use crate::domain::ring::{self, RelinkStep, SyncStep};
use crate::infrastructure::listener::Binding;
use crate::infrastructure::transport::{summarize_body, Transport, TransportError};
use crate::infrastructure::wire::{encode_map, encode_pairs, Params, Request, Response};
use crate::presentation::pages;

pub const MIGRATE_INPUT: &str = "migrate";
const ACK: &str = "OK";

/// The agent's `Migrate` call may take this many call timeouts. The host runs up to three
/// bounded calls of its own before it answers.
pub const RELOCATION_CALL_BUDGET: u32 = 4;

/// Deliveries of one ring message, counting the first.
const RING_ATTEMPTS: u32 = 6;
const RING_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Encode a migration payload as query parameters (`name`, `count`, `contents`, `peer`,
/// `former`).
pub fn snapshot_query(snapshot: &AgentSnapshot) -> String {
    let count = snapshot.state.revision.to_string();
    let contents = encode_map(&snapshot.state.contents);
    let peer = snapshot.peer.to_string();
    let former = snapshot.former_address.to_string();
    encode_pairs([
        ("name", snapshot.state.name.as_str()),
        ("count", count.as_str()),
        ("contents", contents.as_str()),
        ("peer", peer.as_str()),
        ("former", former.as_str()),
    ])
}

pub fn snapshot_from_params(params: &Params) -> FleetResult<AgentSnapshot> {
    let name = AgentName::from(params.require("name")?);
    let revision = params.require_u64("count")?;
    let peer = params.require_address("peer")?;
    let former_address = params.require_address("former")?;
    Ok(AgentSnapshot {
        state: AgentState::restore(name, revision, params.nested("contents")),
        peer: PeerLink::new(peer),
        former_address,
    })
}

struct AgentCell {
    state: AgentState,
    peer: PeerLink,
    phase: AgentPhase,
}

/// How a `Migrate` call to the host ended.
enum Relocation {
    Moved(Address),
    /// The host said no or could not be reached; nothing was handed over.
    Refused(String),
    /// No usable answer; the host may have finished the handoff anyway.
    Unknown(String),
}

/// The host server and directory an agent talks to besides its ring.
#[derive(Debug, Clone)]
pub struct AgentLinks {
    pub host: Address,
    pub directory: DirectoryClient,
    pub transport: Transport,
}

pub struct AgentServer {
    name: AgentName,
    address: Address,
    /// Host server that owns this agent and brokers its migration.
    host: Address,
    directory: DirectoryClient,
    /// Address the agent arrived from, if it migrated here.
    former: Option<Address>,
    cell: Mutex<AgentCell>,
    transport: Transport,
    relocation: Transport,
}

impl AgentServer {
    /// A freshly created agent: a ring of one until it joins.
    pub fn new(state: AgentState, address: Address, links: AgentLinks) -> Self {
        let peer = PeerLink::new(address.clone());
        Self::build(state, peer, address, None, links)
    }

    /// An agent rebuilt from a migration snapshot.
    pub fn restore(snapshot: AgentSnapshot, address: Address, links: AgentLinks) -> Self {
        Self::build(
            snapshot.state,
            snapshot.peer,
            address,
            Some(snapshot.former_address),
            links,
        )
    }

    fn build(
        state: AgentState,
        peer: PeerLink,
        address: Address,
        former: Option<Address>,
        links: AgentLinks,
    ) -> Self {
        let relocation = Transport::new(links.transport.timeout() * RELOCATION_CALL_BUDGET);
        Self {
            name: state.name.clone(),
            cell: Mutex::new(AgentCell {
                state,
                peer,
                phase: AgentPhase::Active,
            }),
            address,
            host: links.host,
            directory: links.directory,
            former,
            transport: links.transport,
            relocation,
        }
    }

    pub fn name(&self) -> &AgentName {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> AgentState {
        self.cell.lock().state.clone()
    }

    pub fn peer(&self) -> Address {
        self.cell.lock().peer.address().clone()
    }

    pub fn phase(&self) -> AgentPhase {
        self.cell.lock().phase
    }

    pub async fn handle(self: &Arc<Self>, binding: &Arc<Binding>, request: &Request) -> FleetResult<Reply> {
        if request.is_favicon() {
            return Err(FleetError::NotFound(request.path.clone()));
        }
        let params = &request.params;
        if request.is_command("GET") {
            return match params.get("input") {
                Some(input) if input.eq_ignore_ascii_case(MIGRATE_INPUT) => self.migrate(binding).await,
                Some(input) if !input.is_empty() => {
                    self.update(input, params.get("value").unwrap_or_default())?;
                    Ok(Reply::from(self.page()))
                }
                _ => Ok(Reply::from(self.page())),
            };
        }

        if request.is_command("makePeer") {
            let newcomer = params.require_address("peer")?;
            let successor = self.make_peer(newcomer)?;
            Ok(Reply::from(Response::text(successor.to_string())))
        } else if request.is_command("syncData") {
            let origin = params.require_address("origin")?;
            self.sync_data(origin, params.nested("contents"))?;
            Ok(Reply::from(Response::text(ACK)))
        } else if request.is_command("syncPeer") {
            let new = params.require_address("new")?;
            let old = params.require_address("old")?;
            self.sync_peer(new, old)?;
            Ok(Reply::from(Response::text(ACK)))
        } else {
            Err(FleetError::bad_request(format!(
                "Invalid request for this server: {}",
                request.command
            )))
        }
    }

    fn page(&self) -> Response {
        let (state, peer, phase) = {
            let cell = self.cell.lock();
            (cell.state.clone(), cell.peer.clone(), cell.phase)
        };
        Response::html(200, pages::agent_page(&self.address, &state, &peer, phase))
    }

    fn ensure_active(&self, cell: &AgentCell, what: &str) -> FleetResult<()> {
        if cell.phase == AgentPhase::Active {
            Ok(())
        } else {
            Err(FleetError::Unavailable(format!(
                "agent {} is {} and not accepting {}",
                self.name, cell.phase, what
            )))
        }
    }

    /// Client update. Returns the new revision.
    pub fn update(self: &Arc<Self>, key: &str, value: &str) -> FleetResult<u64> {
        let (revision, contents, peer) = {
            let mut cell = self.cell.lock();
            self.ensure_active(&cell, "updates")?;
            let revision = cell.state.apply_update(key, value);
            (revision, encode_map(&cell.state.contents), cell.peer.address().clone())
        };
        info!(agent = %self.name, key, revision, "Agent updated");
        if peer != self.address {
            self.spawn_forward(peer, sync_data_request(&self.address, &contents), "sync_data");
        }
        Ok(revision)
    }

    /// Anchor side of a ring join. Returns the successor the newcomer should adopt.
    pub fn make_peer(&self, newcomer: Address) -> FleetResult<Address> {
        let successor = {
            let mut cell = self.cell.lock();
            self.ensure_active(&cell, "makePeer")?;
            ring::splice(&mut cell.peer, newcomer.clone())
        };
        metrics::counter!("ferry_sync_messages_total", "kind" => "make_peer").increment(1);
        info!(agent = %self.name, %newcomer, %successor, "Spliced newcomer into ring");
        Ok(successor)
    }

    /// Merge a lap's contents and pass the lap on.
    ///
    /// A newcomer that has not adopted its successor yet ends the lap here; the catch-up lap
    /// it starts on joining carries what it merged around the whole ring.
    pub fn sync_data(self: &Arc<Self>, origin: Address, contents: HashMap<String, String>) -> FleetResult<()> {
        // A lap started before this agent moved ends here, not at the vacated address.
        let own = match &self.former {
            Some(former) if *former == origin => former,
            _ => &self.address,
        };
        let next = {
            let mut cell = self.cell.lock();
            self.ensure_active(&cell, "syncData")?;
            cell.state.merge(contents);
            match ring::sync_step(own, &origin, &cell.peer) {
                SyncStep::LapComplete => None,
                SyncStep::Forward(to) => Some((to, encode_map(&cell.state.contents))),
            }
        };
        match next {
            None => debug!(agent = %self.name, %origin, "Sync lap complete"),
            Some((to, _)) if to == self.address => {
                debug!(agent = %self.name, %origin, "Ring of one, nothing to forward")
            }
            Some((to, contents)) => {
                self.spawn_forward(to, sync_data_request(&origin, &contents), "sync_data")
            }
        }
        Ok(())
    }

    pub fn sync_peer(self: &Arc<Self>, new: Address, old: Address) -> FleetResult<()> {
        let step = {
            let mut cell = self.cell.lock();
            self.ensure_active(&cell, "syncPeer")?;
            if new == self.address && cell.peer.points_to(&old) {
                cell.peer.retarget(new.clone());
            }
            ring::relink_step(&self.address, &new, &old, &mut cell.peer)
        };
        match step {
            RelinkStep::Arrived => debug!(agent = %self.name, %old, "Relink lap complete"),
            RelinkStep::Forward { to, relinked } => {
                if relinked {
                    info!(agent = %self.name, %old, %new, "Ring peer relinked after migration");
                }
                if to != self.address {
                    self.spawn_forward(to, sync_peer_request(&new, &old), "sync_peer");
                }
            }
        }
        Ok(())
    }

    /// Join the ring next to `anchor`. The first agent in the fleet is its own anchor.
    pub async fn join_ring(self: &Arc<Self>, anchor: &Address) -> FleetResult<()> {
        if *anchor == self.address {
            debug!(agent = %self.name, "First agent, ring of one");
            return Ok(());
        }
        let request = Request::new("makePeer", encode_pairs([("peer", self.address.to_string().as_str())]));
        metrics::counter!("ferry_sync_messages_total", "kind" => "make_peer").increment(1);
        let response = self.call_following(anchor, request).await?;
        let successor: Address = response.body.trim().parse().map_err(|e| {
            FleetError::Internal(format!("anchor {} sent a bad successor: {}", anchor, e))
        })?;

        let contents = {
            let mut cell = self.cell.lock();
            cell.peer.retarget(successor.clone());
            encode_map(&cell.state.contents)
        };
        info!(agent = %self.name, %anchor, peer = %successor, "Joined ring");
        if successor != self.address {
            self.spawn_forward(successor, sync_data_request(&self.address, &contents), "sync_data");
        }
        Ok(())
    }

    /// Arrival side of a migration: tell the ring that `old` is now this agent.
    pub fn start_relink(self: &Arc<Self>, old: &Address) {
        let next = {
            let mut cell = self.cell.lock();
            if cell.peer.points_to(old) {
                cell.peer.retarget(self.address.clone());
                None
            } else {
                Some(cell.peer.address().clone())
            }
        };
        match next {
            None => debug!(agent = %self.name, %old, "Ring of one, relinked to self"),
            Some(to) if to == self.address => {}
            Some(to) => self.spawn_forward(to, sync_peer_request(&self.address, old), "sync_peer"),
        }
    }

    async fn migrate(self: &Arc<Self>, binding: &Arc<Binding>) -> FleetResult<Reply> {
        let snapshot = {
            let mut cell = self.cell.lock();
            if cell.phase != AgentPhase::Active {
                return Err(FleetError::Unavailable(format!(
                    "agent {} is already {}",
                    self.name, cell.phase
                )));
            }
            cell.phase = AgentPhase::MigratingOut;
            AgentSnapshot {
                state: cell.state.clone(),
                peer: cell.peer.clone(),
                former_address: self.address.clone(),
            }
        };
        info!(agent = %self.name, host = %self.host, "Migration requested");

        match self.request_relocation(&snapshot).await {
            Relocation::Moved(new_address) => Ok(self.become_zombie(binding, new_address)),
            Relocation::Refused(reason) => {
                self.cell.lock().phase = AgentPhase::Active;
                warn!(agent = %self.name, error = %reason, "Migration failed, agent stays");
                Err(FleetError::Unavailable(format!("migration failed: {}", reason)))
            }
            Relocation::Unknown(reason) => self.settle_unknown_relocation(binding, reason).await,
        }
    }

    async fn request_relocation(&self, snapshot: &AgentSnapshot) -> Relocation {
        let request = Request::new("Migrate", snapshot_query(snapshot)).with_host(&self.host);
        match self.relocation.call_ok(&self.host, &request).await {
            Ok(response) => match response.body.trim().parse() {
                Ok(address) => Relocation::Moved(address),
                Err(e) => Relocation::Unknown(format!("host {} sent a bad address: {}", self.host, e)),
            },
            // The host could not confirm its own handoff.
            Err(err @ TransportError::Status { status: 504, .. }) => Relocation::Unknown(err.to_string()),
            Err(err @ (TransportError::Connect { .. } | TransportError::Status { .. })) => {
                Relocation::Refused(err.to_string())
            }
            Err(err) => Relocation::Unknown(err.to_string()),
        }
    }

    /// The host gave no usable answer. The directory entry moves only after a successful
    /// handoff, so it tells whether another copy is live.
    async fn settle_unknown_relocation(
        self: &Arc<Self>,
        binding: &Arc<Binding>,
        reason: String,
    ) -> FleetResult<Reply> {
        warn!(agent = %self.name, error = %reason, "Migration outcome unknown, asking the directory");
        match self.directory.lookup(&self.name).await {
            Ok(current) if current != self.address => return Ok(self.become_zombie(binding, current)),
            Ok(_) => error!(agent = %self.name, "Migration outcome unknown, agent stays out of service"),
            Err(e) => error!(agent = %self.name, error = %e, "Migration outcome unknown, agent stays out of service"),
        }
        Err(FleetError::Unavailable(format!(
            "migration of {} did not complete: {}",
            self.name, reason
        )))
    }

    fn become_zombie(&self, binding: &Arc<Binding>, new_address: Address) -> Reply {
        self.cell.lock().phase = AgentPhase::Zombie;
        binding.swap_behavior(Behavior::Zombie(Arc::new(Zombie::new(
            self.name.clone(),
            new_address.clone(),
        ))));
        info!(agent = %self.name, from = %self.address, to = %new_address, "Agent migrated");
        Reply::from(pages::redirect_response(new_address.url()))
    }

    fn spawn_forward(self: &Arc<Self>, to: Address, request: Request, kind: &'static str) {
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            metrics::counter!("ferry_sync_messages_total", "kind" => kind).increment(1);
            match agent.call_following(&to, request).await {
                Ok(_) => trace!(agent = %agent.name, peer = %to, kind, "Ring message delivered"),
                Err(e) => warn!(agent = %agent.name, peer = %to, kind, error = %e, "Ring message not delivered"),
            }
        });
    }

    /// Send a ring message to `to`.
    ///
    /// A redirect means the target moved and left a zombie: the message goes to the new
    /// address and a peer link still pointing at the old one is healed. A `503` means the
    /// target is mid-migration; the message is retried with a growing delay.
    async fn call_following(&self, to: &Address, request: Request) -> FleetResult<Response> {
        let mut target = to.clone();
        let mut attempt = 1;
        loop {
            let response = self.transport.call(&target, &request.clone().with_host(&target)).await?;
            if response.is_success() {
                return Ok(response);
            }
            if let Some(next) = response.location_address().filter(|_| response.is_redirect()) {
                self.heal_peer(&target, &next);
                target = next;
            } else if response.status == 503 && attempt < RING_ATTEMPTS {
                debug!(agent = %self.name, peer = %target, attempt, "Peer busy, retrying");
                tokio::time::sleep(RING_RETRY_DELAY * attempt).await;
            } else {
                return Err(FleetError::Unavailable(format!(
                    "{} answered {}: {}",
                    target,
                    response.status,
                    summarize_body(&response.body)
                )));
            }
            attempt += 1;
            if attempt > RING_ATTEMPTS {
                return Err(FleetError::Unavailable(format!(
                    "{} not reached after {} attempts",
                    to, RING_ATTEMPTS
                )));
            }
        }
    }

    fn heal_peer(&self, from: &Address, to: &Address) {
        let mut cell = self.cell.lock();
        if cell.peer.points_to(from) {
            cell.peer.retarget(to.clone());
            info!(agent = %self.name, %from, %to, "Healed ring peer from redirect");
        }
    }
}

fn sync_data_request(origin: &Address, contents: &str) -> Request {
    let origin = origin.to_string();
    Request::new(
        "syncData",
        encode_pairs([("origin", origin.as_str()), ("contents", contents)]),
    )
}

fn sync_peer_request(new: &Address, old: &Address) -> Request {
    let new = new.to_string();
    let old = old.to_string();
    Request::new("syncPeer", encode_pairs([("new", new.as_str()), ("old", old.as_str())]))
}

impl std::fmt::Debug for AgentServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServer")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("host", &self.host)
            .finish()
    }
}
