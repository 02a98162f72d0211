//! Liveness watchdog for the WDA MJPEG streaming channel.
//!
//! The MJPEG socket stays open for as long as WDA is healthy, so its
//! liveness doubles as a health signal for the whole automation backend.
//! The payload itself is read and discarded.
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Connected
//!      ▲               │              │ close / end / error
//!      │ delay         │ error        ▼
//!      └──────── Disconnected(retrying) ── attempts exhausted ──▶ escalate
//! ```
//!
//! A caller-initiated [`WatchdogHandle::disconnect`] half-closes the socket
//! and ends the task without touching the retry budget.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::error::FatalReason;
use crate::escalation::SharedEscalation;

const READ_BUFFER_BYTES: usize = 16 * 1024;

/// Opens the streaming channel.
///
/// Trait exists so tests can script connect outcomes without a socket.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Human-readable target for logs.
    fn target(&self) -> String;
}

/// Production connector: plain TCP to the MJPEG port.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl StreamConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect(&self.addr).await
    }

    fn target(&self) -> String {
        self.addr.clone()
    }
}

/// Socket bookkeeping. Changes only on socket lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogState {
    pub connected: bool,
    pub retrying: bool,
    /// Reconnect attempts since the last successful connect, `0..=max_attempts`.
    pub attempt: u32,
}

/// What to do after the channel was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossDecision {
    Reconnect { attempt: u32 },
    GiveUp,
}

impl WatchdogState {
    pub fn on_connected(&mut self) {
        self.connected = true;
        self.retrying = false;
        self.attempt = 0;
    }

    /// Record a close, end, error or failed connect.
    ///
    /// At most `max_attempts` reconnects, so `attempt` stays within
    /// `0..=max_attempts`. Comparing with `<=` would make one extra reconnect
    /// and break that bound.
    pub fn on_lost(&mut self, max_attempts: u32) -> LossDecision {
        self.connected = false;
        self.retrying = true;
        if self.attempt < max_attempts {
            self.attempt += 1;
            LossDecision::Reconnect {
                attempt: self.attempt,
            }
        } else {
            LossDecision::GiveUp
        }
    }

    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.retrying = false;
    }
}

/// How the watchdog task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogExit {
    /// Closed on request.
    Disconnected,
    /// Retries exhausted; escalation was triggered.
    Escalated(FatalReason),
}

enum StreamEnd {
    Cancelled,
    Ended,
    Errored(io::Error),
}

/// Handle to a running watchdog.
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<Mutex<WatchdogState>>,
    cancel: CancellationToken,
}

impl WatchdogHandle {
    /// Gracefully close the channel. Does not count as a failure.
    pub fn disconnect(&self) {
        info!("Disconnecting from WdaMjpeg");
        self.cancel.cancel();
    }

    pub fn state(&self) -> WatchdogState {
        *self.state.lock()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub struct Watchdog<C: StreamConnector> {
    connector: C,
    config: WatchdogConfig,
    escalation: SharedEscalation,
    state: Arc<Mutex<WatchdogState>>,
    cancel: CancellationToken,
}

impl<C: StreamConnector> Watchdog<C> {
    pub fn new(connector: C, config: WatchdogConfig, escalation: SharedEscalation) -> Self {
        Self {
            connector,
            config,
            escalation,
            state: Arc::new(Mutex::new(WatchdogState::default())),
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        WatchdogHandle {
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Start watching on the current runtime.
    pub fn spawn(self) -> (WatchdogHandle, JoinHandle<WatchdogExit>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Connect, watch, reconnect; returns once disconnected or escalated.
    pub async fn run(self) -> WatchdogExit {
        let target = self.connector.target();
        let delay = self.config.reconnect_delay();

        loop {
            info!(%target, "Connecting to WdaMjpeg");
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.finish_disconnected(),
                result = self.connector.connect() => result,
            };

            let loss = match connected {
                Ok(stream) => {
                    self.state.lock().on_connected();
                    info!(%target, "Connected to WdaMjpeg");
                    match self.watch(stream).await {
                        StreamEnd::Cancelled => return self.finish_disconnected(),
                        StreamEnd::Ended => {
                            warn!(%target, "WdaMjpeg connection was ended");
                            None
                        }
                        StreamEnd::Errored(e) => {
                            warn!(%target, error = %e, "WdaMjpeg connection errored");
                            Some(e)
                        }
                    }
                }
                Err(e) => {
                    warn!(%target, error = %e, "WdaMjpeg connection errored");
                    Some(e)
                }
            };

            let decision = self.state.lock().on_lost(self.config.max_attempts);
            match decision {
                LossDecision::Reconnect { attempt } => {
                    info!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling WdaMjpeg reconnect"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return self.finish_disconnected(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                LossDecision::GiveUp => {
                    return WatchdogExit::Escalated(self.escalation.channel_lost(loss.as_ref()));
                }
            }
        }
    }

    async fn watch(&self, mut stream: C::Stream) -> StreamEnd {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = stream.read(&mut buf) => Some(read),
            };
            match read {
                None => {
                    half_close(&mut stream, &mut buf, self.config.drain_timeout()).await;
                    return StreamEnd::Cancelled;
                }
                Some(Ok(0)) => return StreamEnd::Ended,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return StreamEnd::Errored(e),
            }
        }
    }

    fn finish_disconnected(&self) -> WatchdogExit {
        self.state.lock().on_disconnected();
        info!("WdaMjpeg connection was closed on request");
        WatchdogExit::Disconnected
    }
}

/// Send FIN, then let the peer flush whatever it still has in flight.
async fn half_close<S>(stream: &mut S, buf: &mut [u8], drain_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Shutdown of WdaMjpeg socket failed");
        return;
    }
    let drained = tokio::time::timeout(drain_timeout, async {
        loop {
            match stream.read(buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if drained.is_err() {
        debug!("WdaMjpeg peer did not close within drain timeout");
    }
}
