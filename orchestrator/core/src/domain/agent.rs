// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::address::{Address, PeerLink};

/// Globally unique agent name handed out by the directory.
///
/// Opaque to everyone except the directory, which generates them as random 128-bit tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentName(pub String);

impl AgentName {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Mutable data owned by exactly one agent server at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub name: AgentName,
    pub contents: HashMap<String, String>,
    /// Incremented on every accepted client update. A fresh agent starts at 1.
    pub revision: u64,
}

impl AgentState {
    pub fn new(name: AgentName) -> Self {
        Self {
            name,
            contents: HashMap::new(),
            revision: 1,
        }
    }

    pub fn restore(name: AgentName, revision: u64, contents: HashMap<String, String>) -> Self {
        Self {
            name,
            contents,
            revision,
        }
    }

    /// Client update: last write wins and the revision moves forward.
    pub fn apply_update(&mut self, key: impl Into<String>, value: impl Into<String>) -> u64 {
        self.contents.insert(key.into(), value.into());
        self.revision += 1;
        self.revision
    }

    /// Replication merge. No conflict detection; incoming values overwrite local ones and the
    /// revision is left alone since it counts client updates only.
    pub fn merge<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.contents.insert(k.into(), v.into());
        }
    }
}

/// Lifecycle of an agent server binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Active,
    MigratingOut,
    Zombie,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentPhase::Active => "active",
            AgentPhase::MigratingOut => "migrating-out",
            AgentPhase::Zombie => "zombie",
        };
        f.write_str(s)
    }
}

/// Everything that travels with an agent when it moves to another host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub state: AgentState,
    /// Ring successor at the time of the move.
    pub peer: PeerLink,
    /// Address the agent is leaving; predecessors still point here until relinked.
    pub former_address: Address,
}
