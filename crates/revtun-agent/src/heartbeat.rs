//! Application-level liveness probing
//!
//! The heartbeat is the sole fault detector for a session; no read
//! timeouts on the transport are relied upon. One probe channel per
//! session, and the first fault delivers exactly one disconnect signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use revtun_core::error::TransportError;
use revtun_core::proto::{CHAN_HEARTBEAT, REQ_HEARTBEAT};
use revtun_core::transport::Session;

pub(crate) struct Heartbeater {
    session: Arc<dyn Session>,
    period: Duration,
    disconnect_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl Heartbeater {
    pub(crate) fn spawn(
        session: Arc<dyn Session>,
        period: Duration,
        disconnect_tx: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) {
        let heartbeater = Self {
            session,
            period,
            disconnect_tx,
            cancel,
        };
        tokio::spawn(heartbeater.run());
    }

    async fn run(self) {
        self.probe().await;
        if self.cancel.is_cancelled() {
            // agent shutdown, not a session fault
            return;
        }
        // one signal per heartbeater lifetime; the buffered channel makes
        // the send non-blocking
        if self.disconnect_tx.try_send(()).is_ok() {
            tracing::info!("sent disconnect signal");
        }
    }

    /// Probe until the first fault or agent shutdown
    async fn probe(&self) {
        let (channel, mut requests) = match self.session.open_channel(CHAN_HEARTBEAT).await {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!("failed to open heartbeat channel: {err}");
                return;
            }
        };

        let local = self.cancel.child_token();
        let (err_tx, mut err_rx) = mpsc::channel::<TransportError>(2);

        let ticker = {
            let local = local.clone();
            let err_tx = err_tx.clone();
            let period = self.period;
            tokio::spawn(async move {
                loop {
                    if let Err(err) = channel.send_request(REQ_HEARTBEAT, false, &[]).await {
                        let _ = err_tx.try_send(err);
                        return;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(period) => {}
                        _ = local.cancelled() => return,
                    }
                }
            })
        };

        let drain = {
            let local = local.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        req = requests.recv() => match req {
                            Some(req) => {
                                // informational; no reply expected
                                tracing::debug!(name = req.name(), "heartbeat: out of band request");
                            }
                            None => {
                                let _ = err_tx.try_send(TransportError::PeerClosed);
                                return;
                            }
                        },
                        _ = local.cancelled() => return,
                    }
                }
            })
        };

        tokio::select! {
            err = err_rx.recv() => {
                if let Some(err) = err {
                    tracing::warn!("heartbeat fault: {err}");
                }
            }
            _ = self.cancel.cancelled() => {}
        }
        local.cancel();
        let _ = tokio::join!(ticker, drain);
    }
}
