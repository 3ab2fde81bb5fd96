// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Binding Behaviours
//!
//! Every listener serves exactly one of four endpoint kinds. The variant is swapped in place
//! when an agent migrates away and its binding turns into a zombie.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::agent_server::AgentServer;
use crate::application::directory_service::DirectoryService;
use crate::application::host_server::HostServer;
use crate::application::zombie::Zombie;
use crate::domain::error::FleetError;
use crate::infrastructure::listener::Binding;
use crate::infrastructure::wire::{Request, Response};
use crate::presentation::pages;

#[derive(Clone)]
pub enum Behavior {
    Directory(Arc<DirectoryService>),
    Host(Arc<HostServer>),
    Agent(Arc<AgentServer>),
    Zombie(Arc<Zombie>),
}

/// What the binding does once the response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Shutdown,
}

#[derive(Debug)]
pub struct Reply {
    pub response: Response,
    pub disposition: Disposition,
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self {
            response,
            disposition: Disposition::Continue,
        }
    }
}

impl Behavior {
    pub fn kind(&self) -> &'static str {
        match self {
            Behavior::Directory(_) => "directory",
            Behavior::Host(_) => "host",
            Behavior::Agent(_) => "agent",
            Behavior::Zombie(_) => "zombie",
        }
    }

    pub async fn handle(&self, binding: &Arc<Binding>, request: Request) -> Reply {
        let result = match self {
            Behavior::Directory(directory) => directory.handle(&request),
            Behavior::Host(host) => host.handle(&request).await,
            Behavior::Agent(agent) => agent.handle(binding, &request).await,
            Behavior::Zombie(zombie) => return zombie.handle(&request),
        };
        match result {
            Ok(reply) => reply,
            Err(err) => {
                log_failure(self.kind(), &request, &err);
                Reply::from(pages::error_response(&err))
            }
        }
    }
}

fn log_failure(kind: &str, request: &Request, err: &FleetError) {
    match err {
        FleetError::BadRequest(_) | FleetError::NotFound(_) => {
            debug!(behavior = kind, command = %request.command, error = %err, "Request rejected")
        }
        FleetError::Unavailable(_) | FleetError::Unconfirmed(_) | FleetError::Internal(_) => {
            warn!(behavior = kind, command = %request.command, error = %err, "Request failed")
        }
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}
