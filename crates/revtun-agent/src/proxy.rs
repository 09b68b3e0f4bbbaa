//! Splice workers for proxied channels
//!
//! Every worker owns its channel (and downstream connection) exclusively.
//! On every exit path both endpoints end up closed and both copy
//! directions have completed; a worker never leaks an endpoint or returns
//! with a copier still running.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use revtun_core::authority::AuthorityClient;
use revtun_core::transport::{Channel, Requests};

/// Splice one accepted access-point channel onto a fresh control-plane
/// connection
pub(crate) async fn proxy_access_point(
    channel: Channel,
    _requests: Requests,
    authority: Arc<dyn AuthorityClient>,
) {
    let conn = match authority.dial_control_plane().await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!("error dialing control plane: {err}");
            // dropping the channel closes it
            return;
        }
    };
    splice(channel, conn).await;
}

/// Splice one accepted transport channel onto the TCP endpoint named by
/// its first request
pub(crate) async fn proxy_transport(channel: Channel, mut requests: Requests, dial_timeout: Duration) {
    // only the first request carries the dial directive; its name is read
    // positionally and ignored
    let req = match timeout(dial_timeout, requests.recv()).await {
        Ok(Some(req)) => req,
        Ok(None) => {
            tracing::info!("connection closed, returning");
            return;
        }
        Err(_) => {
            tracing::error!("timeout waiting for dial request");
            return;
        }
    };

    let server = String::from_utf8_lossy(req.payload()).into_owned();
    tracing::debug!(%server, "got out of band dial request");

    let conn = match TcpStream::connect(&server).await {
        Ok(conn) => conn,
        Err(err) => {
            // no success reply; the peer infers failure from its absence
            tracing::error!(%server, "failed to dial: {err}");
            return;
        }
    };
    req.reply(true, b"connected");

    tracing::debug!(%server, "successfully dialed, start proxying");
    splice(channel, conn).await;
}

/// Copy bytes in both directions until either side ends, then close both
async fn splice<A, B>(mut a: A, mut b: B)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::io::copy_bidirectional(&mut a, &mut b).await {
        Ok((sent, received)) => tracing::debug!(sent, received, "splice finished"),
        Err(err) => tracing::debug!("splice ended: {err}"),
    }
    // both endpoints drop here
}
