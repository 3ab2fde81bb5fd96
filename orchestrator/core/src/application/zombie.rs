// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tracing::info;

use crate::application::behavior::{Disposition, Reply};
use crate::domain::address::Address;
use crate::domain::agent::AgentName;
use crate::infrastructure::wire::Request;
use crate::presentation::pages;

/// What an agent's old binding turns into after it moved: the next request is redirected to
/// the new address (query intact) and then the binding shuts down.
#[derive(Debug, Clone)]
pub struct Zombie {
    name: AgentName,
    forward_to: Address,
}

impl Zombie {
    pub fn new(name: AgentName, forward_to: Address) -> Self {
        Self { name, forward_to }
    }

    pub fn handle(&self, request: &Request) -> Reply {
        let location = self.forward_to.url_with_query(request.query.as_deref());
        info!(
            agent = %self.name,
            command = %request.command,
            %location,
            "Zombie redirecting latecomer"
        );
        Reply {
            response: pages::redirect_response(location),
            disposition: Disposition::Shutdown,
        }
    }
}
