// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `ferry-core`: Agent Fleet Core
//!
//! Hosts stateful agents across a fleet of host servers coordinated by a directory, and lets
//! an agent move between hosts while keeping its data and redirecting latecomers.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | addresses, agent state, directory registry, ring rules, config |
//! | [`infrastructure`] | Infrastructure | wire codec, TCP transport, listener bindings |
//! | [`application`] | Application | directory service, host server, agent server, zombie stub |
//! | [`presentation`] | Presentation | HTML pages served to browsers |
//!
//! ## Request Flow
//!
//! client → host server (create / migrate) → directory (register / lookup) → agent server →
//! zombie (transient). Replication runs agent → ring peer, outside the control path.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
