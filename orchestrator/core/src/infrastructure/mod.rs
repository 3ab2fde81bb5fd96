// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod listener;
pub mod transport;
pub mod wire;

pub use listener::{Binding, BoundListener, ListenerError};
pub use transport::{Transport, TransportError};
