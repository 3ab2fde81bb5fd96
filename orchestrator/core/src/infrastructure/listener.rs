// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Listener Bindings
//!
//! A [`Binding`] is one TCP listener with exactly one [`Behavior`]. Each accepted connection is
//! served on its own task: read one request, dispatch it to the current behaviour, write the
//! response, close.
//!
//! The behaviour can be swapped at runtime (an agent becoming a zombie). Shutdown is
//! cooperative: a flag is raised and a throwaway connection is made to the listener so the
//! accept loop wakes up, sees the flag and exits. Handlers already running are left to finish.

use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::application::behavior::{Behavior, Disposition, Reply};
use crate::domain::address::Address;
use crate::domain::error::FleetError;
use crate::infrastructure::transport::Transport;
use crate::infrastructure::wire::{read_request, Request, WireError};
use crate::presentation::pages;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {bind_address}:{port}: {source}")]
    Bind {
        bind_address: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// A bound but not yet serving listener. Splitting bind from serve lets the caller learn the
/// (possibly ephemeral) port before the behaviour that needs it exists.
pub struct BoundListener {
    listener: TcpListener,
    local: SocketAddr,
    address: Address,
}

impl BoundListener {
    /// Bind `bind_address:port`; port 0 picks an ephemeral port. The advertised address pairs
    /// `advertise_host` with the port actually bound.
    pub async fn bind(bind_address: &str, port: u16, advertise_host: &str) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            bind_address: bind_address.to_string(),
            port,
            source,
        };
        let listener = TcpListener::bind((bind_address, port)).await.map_err(bind_err)?;
        let local = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            listener,
            local,
            address: Address::new(advertise_host, local.port()),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Start the accept loop with `behavior`.
    pub fn serve(self, behavior: Behavior, transport: Transport) -> Arc<Binding> {
        let wake_ip = match self.local.ip() {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => ip,
        };
        let (closed, _) = watch::channel(false);
        let binding = Arc::new(Binding {
            address: self.address,
            wake_address: Address::from(SocketAddr::new(wake_ip, self.local.port())),
            behavior: RwLock::new(behavior),
            shutdown: AtomicBool::new(false),
            closed,
            transport,
        });
        info!(
            address = %binding.address,
            behavior = binding.behavior_kind(),
            "Binding listening"
        );
        tokio::spawn(Arc::clone(&binding).accept_loop(self.listener));
        binding
    }
}

pub struct Binding {
    address: Address,
    /// Where the wake-up connection goes; loopback when bound to a wildcard address.
    wake_address: Address,
    behavior: RwLock<Behavior>,
    shutdown: AtomicBool,
    closed: watch::Sender<bool>,
    transport: Transport,
}

impl Binding {
    pub fn address(&self) -> &Address {
        &self.address
    }

    fn behavior(&self) -> Behavior {
        self.behavior.read().clone()
    }

    pub fn behavior_kind(&self) -> &'static str {
        self.behavior.read().kind()
    }

    /// Replace the behaviour for every request accepted from now on.
    pub fn swap_behavior(&self, next: Behavior) {
        let previous = std::mem::replace(&mut *self.behavior.write(), next);
        info!(
            address = %self.address,
            from = previous.kind(),
            to = self.behavior_kind(),
            "Binding behaviour swapped"
        );
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Raise the shutdown flag and wake the accept loop. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(address = %self.address, "Binding shutting down");
        self.transport.poke(&self.wake_address).await;
    }

    /// Wait until the accept loop has exited and the port is released.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if self.is_shutting_down() {
                        trace!(address = %self.address, %peer, "Dropping connection after shutdown");
                        break;
                    }
                    let binding = Arc::clone(&self);
                    tokio::spawn(async move { binding.handle_connection(stream).await });
                }
                Err(e) => {
                    if self.is_shutting_down() {
                        break;
                    }
                    warn!(address = %self.address, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
        drop(listener);
        self.closed.send_replace(true);
        info!(address = %self.address, "Binding closed");
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let read = tokio::time::timeout(self.transport.timeout(), read_request(&mut reader)).await;
        let reply = match read {
            Ok(Ok(request)) => self.dispatch(request).await,
            Ok(Err(WireError::Empty)) => {
                trace!(address = %self.address, "Connection closed without a request");
                return;
            }
            Ok(Err(e)) => Reply::from(pages::error_response(&FleetError::bad_request(e.to_string()))),
            Err(_) => {
                debug!(address = %self.address, "Timed out waiting for a request");
                return;
            }
        };

        let encoded = reply.response.encode();
        if let Err(e) = write_half.write_all(encoded.as_bytes()).await {
            debug!(address = %self.address, error = %e, "Failed to write response");
        }
        let _ = write_half.shutdown().await;

        if reply.disposition == Disposition::Shutdown {
            self.shutdown().await;
        }
    }

    async fn dispatch(self: &Arc<Self>, request: Request) -> Reply {
        let behavior = self.behavior();
        metrics::counter!("ferry_requests_total", "behavior" => behavior.kind()).increment(1);
        debug!(
            address = %self.address,
            behavior = behavior.kind(),
            command = %request.command,
            path = %request.path,
            "Request received"
        );
        behavior.handle(self, request).await
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("address", &self.address)
            .field("behavior", &self.behavior_kind())
            .field("shutdown", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::zombie::Zombie;
    use crate::domain::agent::AgentName;

    #[tokio::test]
    async fn test_zombie_binding_redirects_once_then_closes() {
        let bound = BoundListener::bind("127.0.0.1", 0, "127.0.0.1").await.unwrap();
        let address = bound.address().clone();
        let target = Address::new("127.0.0.1", 4242);
        let binding = bound.serve(
            Behavior::Zombie(Arc::new(Zombie::new(AgentName::from("z"), target.clone()))),
            Transport::default(),
        );

        let resp = Transport::default()
            .call(&address, &Request::new("GET", "input=color&value=red"))
            .await
            .unwrap();
        assert!(resp.is_redirect());
        assert_eq!(
            resp.location.as_deref(),
            Some("http://127.0.0.1:4242/?input=color&value=red")
        );

        tokio::time::timeout(Duration::from_secs(5), binding.closed())
            .await
            .unwrap();
        assert!(binding.is_closed());
        assert!(Transport::default()
            .call(&address, &Request::new("GET", ""))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = BoundListener::bind("127.0.0.1", 0, "127.0.0.1").await.unwrap();
        let taken = first.address().port;
        let err = BoundListener::bind("127.0.0.1", taken, "127.0.0.1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ListenerError::Bind { port, .. } if port == taken));
    }
}
