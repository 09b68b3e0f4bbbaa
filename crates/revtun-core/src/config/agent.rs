//! Agent configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::serde_utils::duration_secs;
use crate::addr::NetAddr;
use crate::proto;

/// Configuration for a reverse tunnel agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Proxy endpoint the agent dials out to
    pub proxy_addr: NetAddr,

    /// Site identity, presented as the SSH user on every handshake
    pub site_id: String,

    /// Interval between heartbeat probes
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// How long the transport proxy waits for its dial directive
    #[serde(with = "duration_secs")]
    pub dial_request_timeout: Duration,

    /// Timeout for a single connection attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            proxy_addr: NetAddr::tcp(""),
            site_id: String::new(),
            heartbeat_interval: proto::HEARTBEAT_PERIOD,
            dial_request_timeout: proto::DIAL_REQUEST_TIMEOUT,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    /// Config for one proxy endpoint and site identity, default timers
    pub fn new(proxy_addr: NetAddr, site_id: impl Into<String>) -> Self {
        Self {
            proxy_addr,
            site_id: site_id.into(),
            ..Self::default()
        }
    }
}
