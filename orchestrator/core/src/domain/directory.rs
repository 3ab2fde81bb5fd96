// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Directory Registry
//!
//! The two collections behind the directory service:
//!
//! - an append-only sequence of host server registrations (duplicates kept, never removed), and
//! - the agent directory, one entry per agent name mapping to its current address.
//!
//! This type holds no lock. [`crate::application::directory_service::DirectoryService`] owns it
//! behind a mutex.

use std::collections::HashMap;

use crate::domain::address::Address;
use crate::domain::agent::AgentName;

/// Answer to a successful agent registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: AgentName,
    /// Existing agent to splice the newcomer next to, or the newcomer itself when it is the
    /// first agent in the fleet.
    pub anchor: Address,
}

#[derive(Debug, Default, Clone)]
pub struct Directory {
    host_servers: Vec<Address>,
    agents: HashMap<AgentName, Address>,
    /// Agent names in first-registration order; drives anchor choice and the manifest listing.
    order: Vec<AgentName>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_host_server(&mut self, address: Address) {
        self.host_servers.push(address);
    }

    pub fn host_servers(&self) -> &[Address] {
        &self.host_servers
    }

    /// Register a new agent under a name drawn from `generate`.
    ///
    /// Draws again whenever the candidate already names a registered agent, so a duplicate is
    /// never stored.
    pub fn register_agent<F>(&mut self, address: Address, mut generate: F) -> Registration
    where
        F: FnMut() -> AgentName,
    {
        let anchor = self
            .order
            .last()
            .and_then(|name| self.agents.get(name))
            .cloned()
            .unwrap_or_else(|| address.clone());

        let mut name = generate();
        while self.agents.contains_key(&name) {
            tracing::warn!(agent = %name, "Agent name collision, drawing a new name");
            name = generate();
        }

        self.agents.insert(name.clone(), address);
        self.order.push(name.clone());
        Registration { name, anchor }
    }

    /// Overwrite (or create) the entry for `name`. Returns the previous address, if any.
    pub fn migrate(&mut self, name: AgentName, address: Address) -> Option<Address> {
        let previous = self.agents.insert(name.clone(), address);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    pub fn lookup(&self, name: &AgentName) -> Option<&Address> {
        self.agents.get(name)
    }

    /// Agents in registration order with their current address.
    pub fn agents(&self) -> Vec<(AgentName, Address)> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name).map(|a| (name.clone(), a.clone())))
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(port: u16) -> Address {
        Address::new("localhost", port)
    }

    #[test]
    fn test_host_servers_are_append_only_with_duplicates() {
        let mut dir = Directory::new();
        dir.register_host_server(addr(1565));
        dir.register_host_server(addr(1566));
        dir.register_host_server(addr(1565));
        assert_eq!(dir.host_servers(), &[addr(1565), addr(1566), addr(1565)]);
    }

    #[test]
    fn test_first_agent_anchors_on_itself() {
        let mut dir = Directory::new();
        let reg = dir.register_agent(addr(3001), AgentName::generate);
        assert_eq!(reg.anchor, addr(3001));
        assert_eq!(dir.lookup(&reg.name), Some(&addr(3001)));
    }

    #[test]
    fn test_anchor_is_latest_agent_at_current_address() {
        let mut dir = Directory::new();
        let a = dir.register_agent(addr(3001), AgentName::generate);
        let b = dir.register_agent(addr(3002), AgentName::generate);
        assert_eq!(b.anchor, addr(3001));

        dir.migrate(b.name.clone(), addr(4002));
        let c = dir.register_agent(addr(3003), AgentName::generate);
        assert_eq!(c.anchor, addr(4002));
        assert_ne!(a.name, c.name);
    }

    #[test]
    fn test_collision_draws_again() {
        let mut dir = Directory::new();
        let mut scripted = vec![AgentName::from("fresh"), AgentName::from("dup"), AgentName::from("dup")];
        let first = dir.register_agent(addr(1), || scripted.pop().unwrap());
        assert_eq!(first.name, AgentName::from("dup"));
        let second = dir.register_agent(addr(2), || scripted.pop().unwrap());
        assert_eq!(second.name, AgentName::from("fresh"));
        assert_eq!(dir.agent_count(), 2);
    }

    #[test]
    fn test_migrate_overwrites_and_creates() {
        let mut dir = Directory::new();
        let reg = dir.register_agent(addr(3001), AgentName::generate);
        assert_eq!(dir.migrate(reg.name.clone(), addr(3005)), Some(addr(3001)));
        assert_eq!(dir.lookup(&reg.name), Some(&addr(3005)));

        let ghost = AgentName::from("ghost");
        assert_eq!(dir.migrate(ghost.clone(), addr(9)), None);
        assert_eq!(dir.lookup(&ghost), Some(&addr(9)));
        assert_eq!(dir.agents().len(), 2);
    }

    #[test]
    fn test_many_registrations_yield_unique_names() {
        let mut dir = Directory::new();
        let names: HashSet<_> = (0..500)
            .map(|i| dir.register_agent(addr(i), AgentName::generate).name)
            .collect();
        assert_eq!(names.len(), 500);
    }
}
