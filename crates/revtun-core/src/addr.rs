//! Network addresses

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// A remote endpoint: network family plus endpoint string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddr {
    /// Network family, e.g. `tcp`
    pub network: String,
    /// Endpoint within the family, e.g. `proxy.example.com:3024`
    pub addr: String,
}

impl NetAddr {
    /// Create an address in an arbitrary network family
    pub fn new(network: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            addr: addr.into(),
        }
    }

    /// Create a TCP address
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new("tcp", addr)
    }

    /// An address with no endpoint is unusable for dialing
    pub fn is_empty(&self) -> bool {
        self.addr.is_empty()
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.network.is_empty() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}://{}", self.network, self.addr)
        }
    }
}

impl FromStr for NetAddr {
    type Err = AgentError;

    /// Parse `net://host:port`; a bare `host:port` defaults to TCP
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, addr) = match s.split_once("://") {
            Some((network, addr)) => (network, addr),
            None => ("tcp", s),
        };
        if addr.is_empty() {
            return Err(AgentError::BadParameter {
                name: "addr",
                message: format!("missing endpoint in address {s:?}"),
            });
        }
        Ok(Self::new(network, addr))
    }
}
