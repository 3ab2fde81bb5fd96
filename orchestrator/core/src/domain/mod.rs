// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure fleet types with no I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`address`] | `Address`, `PeerLink` |
//! | [`agent`] | `AgentName`, `AgentState`, `AgentPhase`, `AgentSnapshot` |
//! | [`directory`] | `Directory`, `Registration` |
//! | [`ring`] | `sync_step`, `relink_step`, `splice`, `trace_ring` |
//! | [`fleet_config`] | `FleetConfig` |
//! | [`error`] | `FleetError` |

pub mod address;
pub mod agent;
pub mod directory;
pub mod error;
pub mod fleet_config;
pub mod ring;
