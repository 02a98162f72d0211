//! Local fact bus
//!
//! Broadcasts every published fact to in-process subscribers and mirrors it
//! as one JSON line on an output stream (stdout in production).

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use wda_bridge::facts::{Destination, Fact};
use wda_bridge::ports::FactSink;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to FactBus
pub type SharedFactBus = Arc<FactBus>;

/// A published fact with its destination.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub destination: Destination,
    pub published_at: DateTime<Utc>,
    pub fact: Fact,
}

pub struct FactBus {
    sender: broadcast::Sender<Envelope>,
    output: Option<Mutex<Box<dyn Write + Send>>>,
}

impl FactBus {
    /// Bus without an output mirror
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            output: None,
        }
    }

    /// Bus that also writes each envelope as a JSON line to `output`
    pub fn with_output(output: Box<dyn Write + Send>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            output: Some(Mutex::new(output)),
        }
    }

    pub fn stdout() -> Self {
        Self::with_output(Box::new(std::io::stdout()))
    }

    pub fn shared(self) -> SharedFactBus {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    fn write_line(&self, envelope: &Envelope) {
        let Some(output) = &self.output else {
            return;
        };
        let line = match serde_json::to_string(envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(kind = envelope.fact.kind(), "Failed to encode fact: {e}");
                return;
            }
        };
        let mut out = output.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("Failed to write fact: {e}");
        }
    }
}

impl Default for FactBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FactSink for FactBus {
    fn send(&self, destination: Destination, fact: Fact) {
        let envelope = Envelope {
            destination,
            published_at: Utc::now(),
            fact,
        };
        self.write_line(&envelope);

        let kind = envelope.fact.kind();
        match self.sender.send(envelope) {
            Ok(count) => debug!(kind, receivers = count, "Fact published"),
            Err(_) => debug!(kind, "Fact published (no receivers)"),
        }
    }
}
