//! Device presence reporting over the fact bus.

use std::sync::Arc;

use tracing::warn;
use wda_bridge::facts::{Destination, Fact, Presence, PresenceFact};
use wda_bridge::ports::{FactSink, Notifier};

pub struct BusNotifier {
    serial: String,
    sink: Arc<dyn FactSink>,
}

impl BusNotifier {
    pub fn new(serial: impl Into<String>, sink: Arc<dyn FactSink>) -> Self {
        Self {
            serial: serial.into(),
            sink,
        }
    }

    fn report(&self, presence: Presence, reason: &str) {
        warn!(serial = %self.serial, ?presence, reason, "Device presence changed");
        self.sink.send(
            Destination::Global,
            Fact::DevicePresence(PresenceFact {
                serial: self.serial.clone(),
                presence,
                reason: reason.to_string(),
            }),
        );
    }
}

impl Notifier for BusNotifier {
    fn set_device_temporary_unavailable(&self, reason: &str) {
        self.report(Presence::TemporarilyUnavailable, reason);
    }

    fn set_device_absent(&self, reason: &str) {
        self.report(Presence::Absent, reason);
    }
}
