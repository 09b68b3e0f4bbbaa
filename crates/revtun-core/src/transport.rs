//! Transport seam
//!
//! Abstraction over the SSH transport library: dialing an authenticated
//! session, opening channels by well-known type name, and the per-channel
//! out-of-band request plumbing. The agent core is written against these
//! traits; the concrete SSH binding (and the in-memory transport used by
//! the test suite) live behind them.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use ssh_key::{Certificate, PrivateKey, PublicKey};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};

use crate::addr::NetAddr;
use crate::error::TransportError;

/// A bidirectional byte stream usable as one end of a splice
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> ByteStream for T {}

/// One credential the agent may present during a handshake.
///
/// Methods are tried first-to-last; each handshake presents exactly one.
#[derive(Clone)]
pub enum AuthMethod {
    /// Public-key authentication with the given private key
    PublicKey(Arc<PrivateKey>),
    /// Password authentication
    Password(String),
}

impl AuthMethod {
    /// Method name as it appears in logs and handshake records
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    // never print key material or passwords
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The key a server presents during the handshake
#[derive(Debug, Clone)]
pub enum HostKey {
    /// A plain public key
    Public(PublicKey),
    /// An OpenSSH certificate over the server's key
    Certificate(Box<Certificate>),
}

/// Validates the key a server presented for the given host-port
#[async_trait]
pub trait VerifyHostKey: Send + Sync {
    async fn verify(&self, hostport: &str, key: &HostKey) -> Result<(), TransportError>;
}

/// Parameters for a single handshake attempt
pub struct ClientConfig {
    /// User presented to the server (the agent's site identity)
    pub user: String,
    /// The one credential presented in this attempt
    pub auth: AuthMethod,
    /// Host-key verifier consulted during the handshake
    pub host_key: Arc<dyn VerifyHostKey>,
}

/// Dialer producing authenticated sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one handshake attempt against `addr`.
    ///
    /// The server's host key is validated through `config.host_key`
    /// before authentication completes.
    async fn dial(
        &self,
        addr: &NetAddr,
        config: ClientConfig,
    ) -> Result<Arc<dyn Session>, TransportError>;
}

/// One authenticated transport instance
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a locally-initiated channel of the given type
    async fn open_channel(
        &self,
        channel_type: &str,
    ) -> Result<(Channel, Requests), TransportError>;

    /// Register interest in peer-initiated channels of the given type.
    ///
    /// The receiver yields `None` once the session dies. At most one
    /// handler per channel type; a later call supersedes the earlier one.
    fn handle_channel_open(&self, channel_type: &str) -> mpsc::Receiver<NewChannel>;

    /// Tear down the session and everything multiplexed on it
    async fn close(&self);
}

/// Stream of inbound out-of-band requests on a channel
pub type Requests = mpsc::UnboundedReceiver<ChannelRequest>;

/// Reply to a request sent with `want_reply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReply {
    /// Whether the peer accepted the request
    pub accepted: bool,
    /// Reply payload, empty unless the peer attached one
    pub payload: Bytes,
}

/// An out-of-band request received on a channel
pub struct ChannelRequest {
    name: String,
    payload: Bytes,
    reply: Option<oneshot::Sender<RequestReply>>,
}

impl ChannelRequest {
    /// Assemble a request; transports construct these for delivery
    pub fn new(
        name: impl Into<String>,
        payload: Bytes,
        reply: Option<oneshot::Sender<RequestReply>>,
    ) -> Self {
        Self {
            name: name.into(),
            payload,
            reply,
        }
    }

    /// Request name; some protocols read requests positionally and
    /// ignore it
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the sender is waiting on a reply
    pub fn wants_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer the request. A no-op for fire-and-forget requests or a
    /// sender that has since gone away.
    pub fn reply(mut self, accepted: bool, payload: &[u8]) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(RequestReply {
                accepted,
                payload: Bytes::copy_from_slice(payload),
            });
        }
    }
}

impl fmt::Debug for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRequest")
            .field("name", &self.name)
            .field("payload_len", &self.payload.len())
            .field("wants_reply", &self.wants_reply())
            .finish()
    }
}

/// A live channel: a byte stream plus an out-of-band request lane.
///
/// Dropping the channel closes the stream; the peer observes EOF.
pub struct Channel {
    stream: Box<dyn ByteStream>,
    outgoing: mpsc::UnboundedSender<ChannelRequest>,
}

impl Channel {
    /// Assemble a channel from its halves; transports construct these
    pub fn new(
        stream: Box<dyn ByteStream>,
        outgoing: mpsc::UnboundedSender<ChannelRequest>,
    ) -> Self {
        Self { stream, outgoing }
    }

    /// Send a named out-of-band request.
    ///
    /// With `want_reply` the call resolves to the peer's answer;
    /// fire-and-forget requests resolve to `None` as soon as the request
    /// is on its way. Fails once the peer is gone.
    pub async fn send_request(
        &self,
        name: &str,
        want_reply: bool,
        payload: &[u8],
    ) -> Result<Option<RequestReply>, TransportError> {
        let payload = Bytes::copy_from_slice(payload);
        if want_reply {
            let (tx, rx) = oneshot::channel();
            self.outgoing
                .send(ChannelRequest::new(name, payload, Some(tx)))
                .map_err(|_| TransportError::PeerClosed)?;
            let reply = rx.await.map_err(|_| TransportError::PeerClosed)?;
            Ok(Some(reply))
        } else {
            self.outgoing
                .send(ChannelRequest::new(name, payload, None))
                .map_err(|_| TransportError::PeerClosed)?;
            Ok(None)
        }
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// A peer-initiated channel awaiting acceptance
pub struct NewChannel {
    channel_type: String,
    channel: Channel,
    requests: Requests,
}

impl NewChannel {
    /// Assemble a pending channel; transports construct these
    pub fn new(channel_type: impl Into<String>, channel: Channel, requests: Requests) -> Self {
        Self {
            channel_type: channel_type.into(),
            channel,
            requests,
        }
    }

    /// The well-known type name the peer opened this channel with
    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    /// Accept the channel, yielding its stream and request lane
    pub fn accept(self) -> Result<(Channel, Requests), TransportError> {
        Ok((self.channel, self.requests))
    }
}
