//! Wire contract between the agent and the proxy
//!
//! Channel-type names and request names below are the protocol; peers
//! match on them byte-for-byte.

use std::time::Duration;

/// Channel the agent opens to carry liveness probes
pub const CHAN_HEARTBEAT: &str = "teleport-heartbeat";

/// Channel the proxy opens to reach the site's control-plane API
pub const CHAN_ACCESS_POINT: &str = "teleport-access-point";

/// Channel the proxy opens to reach an arbitrary TCP endpoint from the site
pub const CHAN_TRANSPORT: &str = "teleport-transport";

/// Request name the proxy uses for the dial directive on a transport
/// channel. The agent reads the first request positionally and ignores
/// the name.
pub const CHAN_TRANSPORT_DIAL_REQ: &str = "teleport-transport-dial";

/// Request name for liveness probes on the heartbeat channel
pub const REQ_HEARTBEAT: &str = "ping";

/// Site is sending heartbeats at the expected interval
pub const SITE_STATUS_ONLINE: &str = "online";

/// Site has missed a series of heartbeats
pub const SITE_STATUS_OFFLINE: &str = "offline";

/// Interval between heartbeat probes
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// How long the transport proxy waits for its dial directive
pub const DIAL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on the reconnect backoff, in seconds
pub const MAX_BACKOFF_SECS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    // Peers match on these names byte-for-byte; renaming them is a
    // protocol break, not a refactor.
    #[test]
    fn test_channel_names_are_stable() {
        assert_eq!(CHAN_HEARTBEAT, "teleport-heartbeat");
        assert_eq!(CHAN_ACCESS_POINT, "teleport-access-point");
        assert_eq!(CHAN_TRANSPORT, "teleport-transport");
        assert_eq!(CHAN_TRANSPORT_DIAL_REQ, "teleport-transport-dial");
        assert_eq!(REQ_HEARTBEAT, "ping");
    }

    #[test]
    fn test_site_status_values() {
        assert_eq!(SITE_STATUS_ONLINE, "online");
        assert_eq!(SITE_STATUS_OFFLINE, "offline");
    }
}
