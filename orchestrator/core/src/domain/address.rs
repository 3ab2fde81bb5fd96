// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Addresses
//!
//! Every participant in the fleet (directory, host servers, agents, zombies) is reached at a
//! `host:port` pair. [`Address`] is that pair; [`PeerLink`] is the weak reference an agent keeps
//! to its ring successor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Network location of a fleet participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address '{0}' is missing a ':port' suffix")]
    MissingPort(String),

    #[error("address '{0}' has an invalid port")]
    InvalidPort(String),
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `http://host:port/` style URL used in redirects and HTML links.
    pub fn url(&self) -> String {
        format!("http://{}/", self)
    }

    /// Same as [`Address::url`] with an optional query string appended.
    pub fn url_with_query(&self, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("http://{}/?{}", self, q),
            _ => self.url(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("http://")
            .unwrap_or(s)
            .trim_end_matches('/');
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(AddressError::MissingPort(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Weak reference from one agent to its ring successor.
///
/// Identifies a participant without owning it and without any claim that it is still
/// reachable; only a successful transport call says that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerLink(Address);

impl PeerLink {
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> &Address {
        &self.0
    }

    pub fn points_to(&self, address: &Address) -> bool {
        &self.0 == address
    }

    /// Re-point the link, returning the previous target.
    pub fn retarget(&mut self, address: Address) -> Address {
        std::mem::replace(&mut self.0, address)
    }
}

impl fmt::Display for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: Address = "localhost:1565".parse().unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 1565);
        assert_eq!(addr.to_string(), "localhost:1565");
    }

    #[test]
    fn test_parse_accepts_url_form() {
        let addr: Address = "http://10.0.0.7:3001/".parse().unwrap();
        assert_eq!(addr, Address::new("10.0.0.7", 3001));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<Address>(), Err(AddressError::Empty));
        assert!(matches!("localhost".parse::<Address>(), Err(AddressError::MissingPort(_))));
        assert!(matches!(":80".parse::<Address>(), Err(AddressError::MissingPort(_))));
        assert!(matches!("host:99999".parse::<Address>(), Err(AddressError::InvalidPort(_))));
    }

    #[test]
    fn test_url_with_query() {
        let addr = Address::new("h", 1);
        assert_eq!(addr.url_with_query(None), "http://h:1/");
        assert_eq!(addr.url_with_query(Some("")), "http://h:1/");
        assert_eq!(addr.url_with_query(Some("input=a")), "http://h:1/?input=a");
    }

    #[test]
    fn test_peer_link_retarget() {
        let mut link = PeerLink::new(Address::new("a", 1));
        assert!(link.points_to(&Address::new("a", 1)));
        let old = link.retarget(Address::new("b", 2));
        assert_eq!(old, Address::new("a", 1));
        assert_eq!(link.address(), &Address::new("b", 2));
    }
}
