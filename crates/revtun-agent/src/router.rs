//! Accept loops for proxy-initiated channels
//!
//! One listener per well-known channel type. A listener exits when its
//! source reports end-of-channels (the session died) or the agent shuts
//! down; each accepted channel gets its own short-lived worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use revtun_core::authority::AuthorityClient;
use revtun_core::proto::{CHAN_ACCESS_POINT, CHAN_TRANSPORT};
use revtun_core::transport::Session;

use crate::proxy;

/// Accept `teleport-access-point` channels and splice each onto a fresh
/// control-plane connection
pub(crate) fn spawn_access_point_router(
    session: &dyn Session,
    authority: Arc<dyn AuthorityClient>,
    cancel: CancellationToken,
) {
    let mut incoming = session.handle_channel_open(CHAN_ACCESS_POINT);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                nch = incoming.recv() => {
                    let Some(nch) = nch else {
                        tracing::info!("connection closed, stopping access point router");
                        return;
                    };
                    tracing::debug!(channel = nch.channel_type(), "got access point request");
                    match nch.accept() {
                        Ok((channel, requests)) => {
                            let authority = Arc::clone(&authority);
                            tokio::spawn(proxy::proxy_access_point(channel, requests, authority));
                        }
                        Err(err) => tracing::error!("failed to accept channel: {err}"),
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    });
}

/// Accept `teleport-transport` channels and splice each onto the TCP
/// endpoint named by its first request
pub(crate) fn spawn_transport_router(
    session: &dyn Session,
    dial_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut incoming = session.handle_channel_open(CHAN_TRANSPORT);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                nch = incoming.recv() => {
                    let Some(nch) = nch else {
                        tracing::info!("connection closed, stopping transport router");
                        return;
                    };
                    tracing::debug!(channel = nch.channel_type(), "got transport request");
                    match nch.accept() {
                        Ok((channel, requests)) => {
                            tokio::spawn(proxy::proxy_transport(channel, requests, dial_timeout));
                        }
                        Err(err) => tracing::error!("failed to accept channel: {err}"),
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    });
}
