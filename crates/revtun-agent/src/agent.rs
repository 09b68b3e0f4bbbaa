//! Agent supervisor and dialer
//!
//! One agent maintains one outbound session to one proxy. The supervisor
//! reconnects with capped backoff on every disconnect signal; the dialer
//! performs a single attempt, presenting each configured credential in
//! turn and verifying the proxy's host key during the handshake.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use revtun_core::authority::AuthorityClient;
use revtun_core::config::AgentConfig;
use revtun_core::error::{AgentError, TransportError};
use revtun_core::proto::MAX_BACKOFF_SECS;
use revtun_core::transport::{AuthMethod, ClientConfig, Session, Transport, VerifyHostKey};

use crate::heartbeat::Heartbeater;
use crate::router;
use crate::verify::CertChainVerifier;

/// Buffer on the disconnect channel so a faulting heartbeater never blocks
const DISCONNECT_CHANNEL_CAPACITY: usize = 10;

/// A reverse tunnel agent bound to one proxy endpoint
pub struct Agent {
    inner: Arc<AgentInner>,
    /// Consumed by `start`
    runtime: Option<(mpsc::Receiver<()>, oneshot::Sender<()>)>,
    /// Consumed by `wait`
    wait_rx: Option<oneshot::Receiver<()>>,
}

struct AgentInner {
    config: AgentConfig,
    auth_methods: Vec<AuthMethod>,
    host_key: Arc<dyn VerifyHostKey>,
    authority: Arc<dyn AuthorityClient>,
    transport: Arc<dyn Transport>,
    disconnect_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl Agent {
    /// An agent that verifies the proxy's host certificate against the
    /// authority store
    pub fn new(
        config: AgentConfig,
        auth_methods: Vec<AuthMethod>,
        authority: Arc<dyn AuthorityClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let host_key = Arc::new(CertChainVerifier::new(Arc::clone(&authority)));
        Self::with_host_key_verifier(config, auth_methods, host_key, authority, transport)
    }

    /// Ad-hoc flavor: the caller supplies the host-key verifier, e.g.
    /// pinning a single-use rendezvous key exchanged out of band. All
    /// other behavior is identical.
    pub fn with_host_key_verifier(
        config: AgentConfig,
        auth_methods: Vec<AuthMethod>,
        host_key: Arc<dyn VerifyHostKey>,
        authority: Arc<dyn AuthorityClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (disconnect_tx, disconnect_rx) = mpsc::channel(DISCONNECT_CHANNEL_CAPACITY);
        let (wait_tx, wait_rx) = oneshot::channel();
        Self {
            inner: Arc::new(AgentInner {
                config,
                auth_methods,
                host_key,
                authority,
                transport,
                disconnect_tx,
                cancel: CancellationToken::new(),
            }),
            runtime: Some((disconnect_rx, wait_tx)),
            wait_rx: Some(wait_rx),
        }
    }

    /// Establish the first session, retrying with capped backoff until it
    /// is live, then keep reconnecting in the background on every
    /// disconnect signal.
    pub async fn start(&mut self) -> Result<(), AgentError> {
        if self.inner.config.proxy_addr.is_empty() {
            return Err(AgentError::BadParameter {
                name: "addr",
                message: "reverse tunnel cannot be created: target address is empty".to_string(),
            });
        }
        let Some((disconnect_rx, wait_tx)) = self.runtime.take() else {
            return Err(AgentError::BadParameter {
                name: "agent",
                message: "agent already started".to_string(),
            });
        };

        let session = match self.inner.reconnect().await {
            Some(session) => session,
            None => return Err(AgentError::Closed),
        };
        tokio::spawn(Arc::clone(&self.inner).run(session, disconnect_rx, wait_tx));
        Ok(())
    }

    /// Block until the agent has shut down (see [`Agent::close`])
    pub async fn wait(&mut self) {
        if self.runtime.is_some() {
            // never started: only an explicit close ends the wait
            self.inner.cancel.cancelled().await;
            return;
        }
        if let Some(wait_rx) = self.wait_rx.take() {
            let _ = wait_rx.await;
        }
    }

    /// Ask the agent to shut down. Idempotent; `wait` returns once the
    /// supervisor has torn down the current session.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tunagent(remote={})", self.inner.config.proxy_addr)
    }
}

impl AgentInner {
    /// Supervisor loop: one reconnect cycle per disconnect signal
    async fn run(
        self: Arc<Self>,
        mut session: Arc<dyn Session>,
        mut disconnect_rx: mpsc::Receiver<()>,
        wait_tx: oneshot::Sender<()>,
    ) {
        tracing::debug!(remote = %self.config.proxy_addr, "handling disconnects");
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                // self holds a sender, so recv never yields None
                _ = disconnect_rx.recv() => {
                    tracing::info!(remote = %self.config.proxy_addr, "detected disconnect, reconnecting");
                    session.close().await;
                    match self.reconnect().await {
                        Some(next) => session = next,
                        None => break,
                    }
                }
            }
        }
        session.close().await;
        let _ = wait_tx.send(());
    }

    /// Retry `connect` with a linearly growing, capped backoff. Returns
    /// `None` only when the agent is closed.
    async fn reconnect(&self) -> Option<Arc<dyn Session>> {
        let mut attempt: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            attempt += 1;
            match self.connect().await {
                Ok(session) => return Some(session),
                Err(err) => {
                    let delay = Duration::from_secs(attempt.min(MAX_BACKOFF_SECS));
                    tracing::info!(
                        remote = %self.config.proxy_addr,
                        attempt,
                        "connect attempt failed: {err}; retrying in {}s",
                        delay.as_secs()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return None,
                    }
                }
            }
        }
    }

    /// One connection attempt: present each credential in order, first
    /// live session wins; on success launch the session workers.
    async fn connect(&self) -> Result<Arc<dyn Session>, AgentError> {
        tracing::debug!(
            remote = %self.config.proxy_addr,
            user = %self.config.site_id,
            "agent connect"
        );

        let mut last_err =
            TransportError::Auth("no authentication methods configured".to_string());
        for method in &self.auth_methods {
            let client_config = ClientConfig {
                user: self.config.site_id.clone(),
                auth: method.clone(),
                host_key: Arc::clone(&self.host_key),
            };
            let attempt = tokio::time::timeout(
                self.config.connect_timeout,
                self.transport.dial(&self.config.proxy_addr, client_config),
            );
            match attempt.await {
                Ok(Ok(session)) => {
                    self.spawn_workers(&session);
                    tracing::info!(remote = %self.config.proxy_addr, "connection established");
                    return Ok(session);
                }
                Ok(Err(err)) => {
                    tracing::debug!(method = method.name(), "handshake failed: {err}");
                    last_err = err;
                }
                Err(_) => {
                    last_err = TransportError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connection attempt timed out",
                    ));
                }
            }
        }
        Err(last_err.into())
    }

    /// Launch the per-session workers: the heartbeater plus one router
    /// per proxy-initiated channel type
    fn spawn_workers(&self, session: &Arc<dyn Session>) {
        Heartbeater::spawn(
            Arc::clone(session),
            self.config.heartbeat_interval,
            self.disconnect_tx.clone(),
            self.cancel.child_token(),
        );
        router::spawn_access_point_router(
            session.as_ref(),
            Arc::clone(&self.authority),
            self.cancel.child_token(),
        );
        router::spawn_transport_router(
            session.as_ref(),
            self.config.dial_request_timeout,
            self.cancel.child_token(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtun_core::transport::HostKey;
    use revtun_core::NetAddr;
    use revtun_testkit::{generate_keypair, StaticAuthorityClient, TestProxy};

    fn stub_agent(config: AgentConfig) -> Agent {
        let proxy = TestProxy::new(
            NetAddr::tcp("127.0.0.1:33001"),
            HostKey::Public(generate_keypair().public_key().clone()),
        );
        let (authority, _control_rx) = StaticAuthorityClient::new(vec![]);
        Agent::new(
            config,
            vec![AuthMethod::PublicKey(Arc::new(generate_keypair()))],
            Arc::new(authority),
            proxy.transport(),
        )
    }

    #[tokio::test]
    async fn test_empty_address_is_bad_parameter() {
        let mut agent = stub_agent(AgentConfig::new(NetAddr::tcp(""), "site-1"));
        let err = agent.start().await.unwrap_err();
        assert!(matches!(err, AgentError::BadParameter { name: "addr", .. }));
    }

    #[tokio::test]
    async fn test_display_names_the_remote() {
        let agent = stub_agent(AgentConfig::new(NetAddr::tcp("127.0.0.1:33001"), "site-1"));
        assert_eq!(agent.to_string(), "tunagent(remote=tcp://127.0.0.1:33001)");
    }

    #[tokio::test]
    async fn test_wait_before_start_returns_on_close() {
        let mut agent = stub_agent(AgentConfig::new(NetAddr::tcp("127.0.0.1:33001"), "site-1"));
        agent.close();
        agent.wait().await;
    }
}
