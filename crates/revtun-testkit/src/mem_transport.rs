//! In-memory transport
//!
//! Implements the `Transport`/`Session` seam over `tokio::io::duplex`
//! streams and crosswired request channels, with a scriptable proxy peer.
//! No network, no real SSH stack: handshakes resolve against a configured
//! policy and the presented host key is whatever the test installed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use revtun_core::error::TransportError;
use revtun_core::transport::{
    AuthMethod, Channel, ClientConfig, HostKey, NewChannel, Requests, Session, Transport,
};
use revtun_core::NetAddr;

const CHANNEL_BUFFER: usize = 16;
const STREAM_BUFFER: usize = 64 * 1024;

/// One recorded handshake attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    /// User the agent presented
    pub user: String,
    /// Name of the single method presented
    pub method: &'static str,
}

type AuthPolicy = Box<dyn Fn(&str, &AuthMethod) -> bool + Send + Sync>;

/// Build both halves of a channel: duplex byte stream plus crosswired
/// request lanes.
fn channel_pair() -> ((Channel, Requests), (Channel, Requests)) {
    let (a, b) = tokio::io::duplex(STREAM_BUFFER);
    let (tx_ab, rx_ab) = mpsc::unbounded_channel();
    let (tx_ba, rx_ba) = mpsc::unbounded_channel();
    (
        (Channel::new(Box::new(a), tx_ab), rx_ba),
        (Channel::new(Box::new(b), tx_ba), rx_ab),
    )
}

/// Shared state of one live session; both ends hold it
struct WireState {
    closed: AtomicBool,
    /// Channel-type handlers registered by the agent side
    handlers: Mutex<HashMap<String, mpsc::Sender<NewChannel>>>,
    handler_added: Notify,
    /// Delivers agent-opened channels to the proxy side
    opened_tx: Mutex<Option<mpsc::UnboundedSender<OpenedChannel>>>,
}

impl WireState {
    fn new(opened_tx: mpsc::UnboundedSender<OpenedChannel>) -> Self {
        Self {
            closed: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            handler_added: Notify::new(),
            opened_tx: Mutex::new(Some(opened_tx)),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Kill the session: pending and future channel opens fail on both
    /// sides, and every registered handler observes end-of-channels.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
        self.opened_tx.lock().unwrap().take();
        self.handler_added.notify_waiters();
    }
}

/// Agent-side session handle
struct MemSession {
    wire: Arc<WireState>,
}

#[async_trait]
impl Session for MemSession {
    async fn open_channel(
        &self,
        channel_type: &str,
    ) -> Result<(Channel, Requests), TransportError> {
        if self.wire.is_closed() {
            return Err(TransportError::PeerClosed);
        }
        let (local, remote) = channel_pair();
        let opened = OpenedChannel {
            channel_type: channel_type.to_string(),
            channel: remote.0,
            requests: remote.1,
        };
        let guard = self.wire.opened_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) if tx.send(opened).is_ok() => Ok(local),
            _ => Err(TransportError::PeerClosed),
        }
    }

    fn handle_channel_open(&self, channel_type: &str) -> mpsc::Receiver<NewChannel> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        if !self.wire.is_closed() {
            self.wire
                .handlers
                .lock()
                .unwrap()
                .insert(channel_type.to_string(), tx);
            self.wire.handler_added.notify_waiters();
        }
        // on a dead session the sender is dropped here and the receiver
        // yields None immediately
        rx
    }

    async fn close(&self) {
        self.wire.close();
    }
}

/// Proxy-side view of a channel the agent opened
pub struct OpenedChannel {
    /// Well-known type name the agent opened the channel with
    pub channel_type: String,
    /// The proxy half of the byte stream
    pub channel: Channel,
    /// Requests the agent sends on the channel
    pub requests: Requests,
}

/// Proxy-side handle to one accepted session
pub struct ProxyConn {
    wire: Arc<WireState>,
    opened_rx: mpsc::UnboundedReceiver<OpenedChannel>,
}

impl ProxyConn {
    /// Next channel the agent opened, or `None` once the session is dead
    pub async fn next_opened(&mut self) -> Option<OpenedChannel> {
        self.opened_rx.recv().await
    }

    /// Open a channel of the given type toward the agent.
    ///
    /// Waits until the agent has registered a handler for the type, which
    /// it does while installing a fresh session.
    pub async fn open_channel(
        &self,
        channel_type: &str,
    ) -> Result<(Channel, Requests), TransportError> {
        let handler = loop {
            let notified = self.wire.handler_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(handler) = self
                .wire
                .handlers
                .lock()
                .unwrap()
                .get(channel_type)
                .cloned()
            {
                break handler;
            }
            if self.wire.is_closed() {
                return Err(TransportError::PeerClosed);
            }
            notified.await;
        };

        let (local, remote) = channel_pair();
        let nch = NewChannel::new(channel_type, remote.0, remote.1);
        handler
            .send(nch)
            .await
            .map_err(|_| TransportError::PeerClosed)?;
        Ok(local)
    }

    /// Hard-close the session from the proxy side.
    ///
    /// Queued agent-opened channels are torn down with it; channel halves
    /// the test already pulled out of [`ProxyConn::next_opened`] stay
    /// alive until dropped.
    pub fn kill(&mut self) {
        self.wire.close();
        self.opened_rx.close();
        while let Ok(opened) = self.opened_rx.try_recv() {
            drop(opened);
        }
    }
}

struct ProxyShared {
    addr: NetAddr,
    host_key: HostKey,
    online: AtomicBool,
    auth_policy: Mutex<AuthPolicy>,
    attempts: Mutex<Vec<AuthAttempt>>,
    accept_tx: mpsc::UnboundedSender<ProxyConn>,
}

/// The agent's dialer, bound to one [`TestProxy`]
pub struct MemTransport {
    shared: Arc<ProxyShared>,
}

#[async_trait]
impl Transport for MemTransport {
    async fn dial(
        &self,
        addr: &NetAddr,
        config: ClientConfig,
    ) -> Result<Arc<dyn Session>, TransportError> {
        let shared = &self.shared;
        if addr != &shared.addr {
            return Err(TransportError::Refused(format!(
                "connection refused: {addr}"
            )));
        }

        // every dial aimed at this proxy is recorded, including ones made
        // while it is down
        shared.attempts.lock().unwrap().push(AuthAttempt {
            user: config.user.clone(),
            method: config.auth.name(),
        });

        if !shared.online.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(format!(
                "connection refused: {addr}"
            )));
        }

        // host key first, then authentication, mirroring the SSH handshake
        config
            .host_key
            .verify(&shared.addr.addr, &shared.host_key)
            .await?;

        let accepted = {
            let policy = shared.auth_policy.lock().unwrap();
            policy(&config.user, &config.auth)
        };
        if !accepted {
            return Err(TransportError::Auth("authentication rejected".into()));
        }

        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let wire = Arc::new(WireState::new(opened_tx));
        let conn = ProxyConn {
            wire: Arc::clone(&wire),
            opened_rx,
        };
        let _ = shared.accept_tx.send(conn);
        Ok(Arc::new(MemSession { wire }))
    }
}

/// A scriptable in-memory proxy peer
pub struct TestProxy {
    shared: Arc<ProxyShared>,
    accept_rx: mpsc::UnboundedReceiver<ProxyConn>,
}

impl TestProxy {
    /// A proxy listening at `addr` that presents `host_key` and accepts
    /// any credentials
    pub fn new(addr: NetAddr, host_key: HostKey) -> Self {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ProxyShared {
            addr,
            host_key,
            online: AtomicBool::new(true),
            auth_policy: Mutex::new(Box::new(|_, _| true)),
            attempts: Mutex::new(Vec::new()),
            accept_tx,
        });
        Self { shared, accept_rx }
    }

    /// The dialer an agent under test should be constructed with
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(MemTransport {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Take the proxy down (dials are refused) or back up
    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::SeqCst);
    }

    /// Decide which user/credential combinations authenticate
    pub fn set_auth_policy(
        &self,
        policy: impl Fn(&str, &AuthMethod) -> bool + Send + Sync + 'static,
    ) {
        *self.shared.auth_policy.lock().unwrap() = Box::new(policy);
    }

    /// Every handshake attempt observed so far, in order
    pub fn auth_attempts(&self) -> Vec<AuthAttempt> {
        self.shared.attempts.lock().unwrap().clone()
    }

    /// Await the next session an agent established
    pub async fn accept(&mut self) -> Option<ProxyConn> {
        self.accept_rx.recv().await
    }

    /// Non-blocking variant of [`TestProxy::accept`]
    pub fn try_accept(&mut self) -> Option<ProxyConn> {
        self.accept_rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct AcceptAnyKey;

    #[async_trait]
    impl revtun_core::transport::VerifyHostKey for AcceptAnyKey {
        async fn verify(&self, _hostport: &str, _key: &HostKey) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_host_key() -> HostKey {
        HostKey::Public(crate::generate_keypair().public_key().clone())
    }

    fn client_config() -> ClientConfig {
        ClientConfig {
            user: "site-1".to_string(),
            auth: AuthMethod::Password("secret".to_string()),
            host_key: Arc::new(AcceptAnyKey),
        }
    }

    #[tokio::test]
    async fn test_dial_wrong_address_refused() {
        let proxy = TestProxy::new(NetAddr::tcp("127.0.0.1:33001"), test_host_key());
        let transport = proxy.transport();

        let err = match transport
            .dial(&NetAddr::tcp("127.0.0.1:1"), client_config())
            .await
        {
            Err(err) => err,
            Ok(_) => panic!("expected dial to be refused"),
        };
        assert!(matches!(err, TransportError::Refused(_)));
        assert!(proxy.auth_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_dial_records_attempts_and_applies_policy() {
        let mut proxy = TestProxy::new(NetAddr::tcp("127.0.0.1:33001"), test_host_key());
        proxy.set_auth_policy(|user, method| user == "site-1" && method.name() == "password");
        let transport = proxy.transport();

        let session = transport
            .dial(&NetAddr::tcp("127.0.0.1:33001"), client_config())
            .await
            .unwrap();
        assert_eq!(
            proxy.auth_attempts(),
            vec![AuthAttempt {
                user: "site-1".to_string(),
                method: "password",
            }]
        );
        assert!(proxy.try_accept().is_some());
        session.close().await;
    }

    #[tokio::test]
    async fn test_agent_opened_channel_reaches_proxy() {
        let mut proxy = TestProxy::new(NetAddr::tcp("127.0.0.1:33001"), test_host_key());
        let transport = proxy.transport();

        let session = transport
            .dial(&NetAddr::tcp("127.0.0.1:33001"), client_config())
            .await
            .unwrap();
        let mut conn = proxy.accept().await.unwrap();

        let (mut agent_half, _reqs) = session.open_channel("teleport-heartbeat").await.unwrap();
        let opened = conn.next_opened().await.unwrap();
        assert_eq!(opened.channel_type, "teleport-heartbeat");

        let mut proxy_half = opened.channel;
        agent_half.write_all(b"beat").await.unwrap();
        agent_half.shutdown().await.unwrap();
        let mut buf = Vec::new();
        proxy_half.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"beat");
    }

    #[tokio::test]
    async fn test_proxy_opened_channel_reaches_handler() {
        let mut proxy = TestProxy::new(NetAddr::tcp("127.0.0.1:33001"), test_host_key());
        let transport = proxy.transport();

        let session = transport
            .dial(&NetAddr::tcp("127.0.0.1:33001"), client_config())
            .await
            .unwrap();
        let mut incoming = session.handle_channel_open("teleport-transport");
        let conn = proxy.accept().await.unwrap();

        let (_proxy_half, _reqs) = conn.open_channel("teleport-transport").await.unwrap();
        let nch = incoming.recv().await.unwrap();
        assert_eq!(nch.channel_type(), "teleport-transport");
    }

    #[tokio::test]
    async fn test_kill_ends_handlers_and_opens() {
        let mut proxy = TestProxy::new(NetAddr::tcp("127.0.0.1:33001"), test_host_key());
        let transport = proxy.transport();

        let session = transport
            .dial(&NetAddr::tcp("127.0.0.1:33001"), client_config())
            .await
            .unwrap();
        let mut incoming = session.handle_channel_open("teleport-access-point");
        let mut conn = proxy.accept().await.unwrap();

        conn.kill();

        assert!(incoming.recv().await.is_none());
        assert!(session.open_channel("teleport-heartbeat").await.is_err());
        assert!(conn.open_channel("teleport-access-point").await.is_err());
    }
}
