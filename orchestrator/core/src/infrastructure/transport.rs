// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transport Primitive
//!
//! "Send request, read response": open a TCP connection, write one request, read one full
//! response, close. Every machine-to-machine call in the fleet goes through [`Transport::call`].
//!
//! Each call is bounded by the configured timeout; expiry is reported as
//! [`TransportError::Timeout`], distinct from refusing or dropping the connection.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::domain::address::Address;
use crate::domain::error::FleetError;
use crate::infrastructure::wire::{read_response, Request, Response, WireError, CRLF};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("call to {address} timed out after {timeout:?}")]
    Timeout { address: Address, timeout: Duration },

    #[error("I/O error talking to {address}: {source}")]
    Io {
        address: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable response from {address}: {source}")]
    Protocol {
        address: Address,
        #[source]
        source: WireError,
    },

    #[error("{address} answered {status}: {detail}")]
    Status {
        address: Address,
        status: u16,
        detail: String,
    },
}

impl From<TransportError> for FleetError {
    fn from(err: TransportError) -> Self {
        FleetError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    timeout: Duration,
}

impl Transport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one request/response exchange. Any status code is returned as-is.
    pub async fn call(&self, address: &Address, request: &Request) -> Result<Response, TransportError> {
        trace!(%address, command = %request.command, "Outgoing call");
        match tokio::time::timeout(self.timeout, self.exchange(address, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                address: address.clone(),
                timeout: self.timeout,
            }),
        }
    }

    /// Like [`Transport::call`], but anything other than a 2xx answer is an error.
    pub async fn call_ok(&self, address: &Address, request: &Request) -> Result<Response, TransportError> {
        let response = self.call(address, request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status {
                address: address.clone(),
                status: response.status,
                detail: summarize_body(&response.body),
            })
        }
    }

    /// Open a connection, send a throwaway line and hang up. Used to wake a listener blocked in
    /// `accept` so it notices a shutdown flag. Failures are irrelevant and ignored.
    pub async fn poke(&self, address: &Address) {
        let attempt = async {
            let mut stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
            stream.write_all(format!("NULL{CRLF}{CRLF}").as_bytes()).await?;
            stream.shutdown().await
        };
        if let Ok(Err(e)) = tokio::time::timeout(self.timeout, attempt).await {
            debug!(%address, error = %e, "Wake-up connection failed");
        }
    }

    async fn exchange(&self, address: &Address, request: &Request) -> Result<Response, TransportError> {
        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|source| TransportError::Connect {
                address: address.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();

        let io_err = |source| TransportError::Io {
            address: address.clone(),
            source,
        };
        write_half
            .write_all(request.encode().as_bytes())
            .await
            .map_err(io_err)?;
        write_half.flush().await.map_err(io_err)?;

        let mut reader = BufReader::new(read_half);
        read_response(&mut reader)
            .await
            .map_err(|source| TransportError::Protocol {
                address: address.clone(),
                source,
            })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Short human-readable summary of an error body: the first `<p>` paragraph of an HTML page,
/// otherwise the trimmed text.
pub fn summarize_body(body: &str) -> String {
    let text = body
        .split_once("<p>")
        .and_then(|(_, rest)| rest.split_once("</p>"))
        .map(|(p, _)| p)
        .unwrap_or(body)
        .trim();
    text.chars().take(200).collect()
}
