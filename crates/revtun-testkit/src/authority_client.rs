//! Credential-store double
//!
//! A fixed (but swappable) authority set plus an in-memory control-plane
//! endpoint handed to the test as duplex server halves.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use revtun_core::authority::{AuthorityClient, CertAuthority};
use revtun_core::error::AuthorityError;
use revtun_core::transport::ByteStream;

const STREAM_BUFFER: usize = 64 * 1024;

/// Scriptable `AuthorityClient` for tests
pub struct StaticAuthorityClient {
    authorities: Mutex<Vec<CertAuthority>>,
    fetches: AtomicUsize,
    control_tx: Mutex<Option<mpsc::UnboundedSender<DuplexStream>>>,
}

impl StaticAuthorityClient {
    /// Build the client plus the receiver on which control-plane server
    /// halves arrive, one per `dial_control_plane` call
    pub fn new(
        authorities: Vec<CertAuthority>,
    ) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        (
            Self {
                authorities: Mutex::new(authorities),
                fetches: AtomicUsize::new(0),
                control_tx: Mutex::new(Some(control_tx)),
            },
            control_rx,
        )
    }

    /// Swap the authority set, e.g. to simulate rotation
    pub fn set_authorities(&self, authorities: Vec<CertAuthority>) {
        *self.authorities.lock().unwrap() = authorities;
    }

    /// How many times the authority set has been fetched
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make future `dial_control_plane` calls fail
    pub fn close_control_plane(&self) {
        self.control_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl AuthorityClient for StaticAuthorityClient {
    async fn host_authorities(&self) -> Result<Vec<CertAuthority>, AuthorityError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.authorities.lock().unwrap().clone())
    }

    async fn dial_control_plane(&self) -> io::Result<Box<dyn ByteStream>> {
        let (client, server) = tokio::io::duplex(STREAM_BUFFER);
        let guard = self.control_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) if tx.send(server).is_ok() => Ok(Box::new(client)),
            _ => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "control plane unavailable",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_fetch_counts_lookups() {
        let (client, _control_rx) = StaticAuthorityClient::new(vec![]);
        assert_eq!(client.fetch_count(), 0);
        client.host_authorities().await.unwrap();
        client.host_authorities().await.unwrap();
        assert_eq!(client.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_control_plane_dial_pairs_with_receiver() {
        let (client, mut control_rx) = StaticAuthorityClient::new(vec![]);

        let mut conn = client.dial_control_plane().await.unwrap();
        let mut server = control_rx.recv().await.unwrap();

        conn.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");
    }

    #[tokio::test]
    async fn test_closed_control_plane_refuses() {
        let (client, _control_rx) = StaticAuthorityClient::new(vec![]);
        client.close_control_plane();
        assert!(client.dial_control_plane().await.is_err());
    }
}
