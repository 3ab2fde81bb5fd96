// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Replication Ring Rules
//!
//! Pure decision functions for the directed ring formed by every live agent's single
//! [`PeerLink`]. The agent server applies these under its state lock and performs the network
//! side effects afterwards.
//!
//! - **Join** ([`splice`]): the newcomer is inserted between the anchor and the anchor's
//!   former successor, which keeps one cycle through all agents.
//! - **Sync data** ([`sync_step`]): merged contents travel around the ring tagged with the
//!   originating agent; the lap ends when the message arrives back at its origin.
//! - **Relink** ([`relink_step`]): after a migration, the predecessor still pointing at the old
//!   address is re-pointed; the message stops once it reaches the migrated agent itself.

use thiserror::Error;

use crate::domain::address::{Address, PeerLink};

/// What to do with a `syncData` message after merging it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// The message came back to its origin; one full lap is done.
    LapComplete,
    Forward(Address),
}

/// What to do with a `syncPeer` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelinkStep {
    /// This agent is the one that migrated.
    Arrived,
    Forward { to: Address, relinked: bool },
}

pub fn sync_step(own: &Address, origin: &Address, peer: &PeerLink) -> SyncStep {
    if own == origin {
        SyncStep::LapComplete
    } else {
        SyncStep::Forward(peer.address().clone())
    }
}

/// Apply a relink notice to `peer` and decide where it goes next.
///
/// The forward target is read after the update, so the agent that re-points its link hands the
/// notice straight to the migrated agent, which ends the lap.
pub fn relink_step(own: &Address, new: &Address, old: &Address, peer: &mut PeerLink) -> RelinkStep {
    if own == new {
        return RelinkStep::Arrived;
    }
    let relinked = peer.points_to(old);
    if relinked {
        peer.retarget(new.clone());
    }
    RelinkStep::Forward {
        to: peer.address().clone(),
        relinked,
    }
}

/// Anchor side of a join: point the anchor at the newcomer and return the anchor's former
/// successor, which becomes the newcomer's peer.
pub fn splice(anchor_peer: &mut PeerLink, newcomer: Address) -> Address {
    anchor_peer.retarget(newcomer)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("no peer recorded for {0}")]
    Dangling(Address),

    #[error("walk from {start} did not return within {limit} hops")]
    Open { start: Address, limit: usize },
}

/// Follow peer links from `start` until the walk returns to it.
///
/// Returns the visited agents in ring order, starting with `start`. A walk that reaches an
/// unknown agent or exceeds `limit` hops means the ring is broken.
pub fn trace_ring<F>(start: &Address, limit: usize, mut next: F) -> Result<Vec<Address>, RingError>
where
    F: FnMut(&Address) -> Option<Address>,
{
    let mut visited = vec![start.clone()];
    let mut current = start.clone();
    for _ in 0..limit {
        let successor = next(&current).ok_or_else(|| RingError::Dangling(current.clone()))?;
        if &successor == start {
            return Ok(visited);
        }
        visited.push(successor.clone());
        current = successor;
    }
    Err(RingError::Open {
        start: start.clone(),
        limit,
    })
}
