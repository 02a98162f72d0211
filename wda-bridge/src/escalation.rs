//! Escalation policy: the single choke point for unrecoverable faults.
//!
//! ```text
//! gateway transport failure ──┐
//!                             ├─▶ notifier (unavailable / absent) ─▶ lifecycle.fatal
//! watchdog retries exhausted ─┘
//! ```
//!
//! The bridge never retries past its bounded policies. Recovery is a full
//! process restart performed by the external supervisor once `fatal` has
//! ended the process. Escalation fires at most once; later reports are
//! logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::{FatalReason, TransportError};
use crate::ports::{Lifecycle, Notifier};

/// Message used when the streaming channel closes without an error.
pub const CONNECTION_LOST: &str = "wda connection is lost";

/// Shared reference to the escalation policy.
pub type SharedEscalation = Arc<EscalationPolicy>;

pub struct EscalationPolicy {
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<dyn Lifecycle>,
    escalated: AtomicBool,
}

impl EscalationPolicy {
    pub fn new(notifier: Arc<dyn Notifier>, lifecycle: Arc<dyn Lifecycle>) -> Self {
        Self {
            notifier,
            lifecycle,
            escalated: AtomicBool::new(false),
        }
    }

    pub fn shared(self) -> SharedEscalation {
        Arc::new(self)
    }

    /// Whether a fatal escalation has already been triggered.
    pub fn is_escalated(&self) -> bool {
        self.escalated.load(Ordering::SeqCst)
    }

    /// A request to the automation backend failed at the transport level.
    ///
    /// Marks the device temporarily unavailable, then absent, then ends the process.
    pub fn request_failed(&self, err: &TransportError) -> FatalReason {
        let message = err.to_string();
        let reason = FatalReason::RequestFailed(message.clone());
        if !self.claim(&reason) {
            return reason;
        }
        self.notifier.set_device_temporary_unavailable(&message);
        self.notifier.set_device_absent(&message);
        self.fire(&reason);
        reason
    }

    /// The streaming channel could not be re-established.
    ///
    /// Marks the device absent (with the socket error when there is one), then ends the process.
    pub fn channel_lost(&self, err: Option<&std::io::Error>) -> FatalReason {
        let message = err
            .map(|e| e.to_string())
            .unwrap_or_else(|| CONNECTION_LOST.to_string());
        let reason = FatalReason::ChannelLost(message.clone());
        if !self.claim(&reason) {
            return reason;
        }
        self.notifier.set_device_absent(&message);
        self.fire(&reason);
        reason
    }

    fn claim(&self, reason: &FatalReason) -> bool {
        if self.escalated.swap(true, Ordering::SeqCst) {
            warn!(%reason, "Fatal escalation already in progress; dropping report");
            return false;
        }
        true
    }

    fn fire(&self, reason: &FatalReason) {
        error!(%reason, "Unrecoverable fault; handing over to supervisor restart");
        self.lifecycle.fatal(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockLifecycle, MockNotifier};
    use mockall::Sequence;

    #[test]
    fn request_failure_marks_unavailable_then_absent_then_fatal() {
        let mut seq = Sequence::new();
        let mut notifier = MockNotifier::new();
        let mut lifecycle = MockLifecycle::new();

        notifier
            .expect_set_device_temporary_unavailable()
            .withf(|r| r == "request to automation backend timed out")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        notifier
            .expect_set_device_absent()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        lifecycle
            .expect_fatal()
            .withf(|r| matches!(r, FatalReason::RequestFailed(_)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let policy = EscalationPolicy::new(Arc::new(notifier), Arc::new(lifecycle));
        let reason = policy.request_failed(&TransportError::Timeout);
        assert_eq!(
            reason,
            FatalReason::RequestFailed("request to automation backend timed out".into())
        );
        assert!(policy.is_escalated());
    }

    #[test]
    fn channel_lost_without_error_uses_generic_message() {
        let mut notifier = MockNotifier::new();
        let mut lifecycle = MockLifecycle::new();
        notifier.expect_set_device_temporary_unavailable().never();
        notifier
            .expect_set_device_absent()
            .withf(|r| r == CONNECTION_LOST)
            .times(1)
            .return_const(());
        lifecycle
            .expect_fatal()
            .withf(|r| *r == FatalReason::ChannelLost(CONNECTION_LOST.into()))
            .times(1)
            .return_const(());

        let policy = EscalationPolicy::new(Arc::new(notifier), Arc::new(lifecycle));
        policy.channel_lost(None);
    }

    #[test]
    fn escalation_fires_only_once() {
        let mut notifier = MockNotifier::new();
        let mut lifecycle = MockLifecycle::new();
        notifier
            .expect_set_device_temporary_unavailable()
            .times(1)
            .return_const(());
        notifier.expect_set_device_absent().times(1).return_const(());
        lifecycle.expect_fatal().times(1).return_const(());

        let policy = EscalationPolicy::new(Arc::new(notifier), Arc::new(lifecycle));
        policy.request_failed(&TransportError::Connect("refused".into()));
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        policy.channel_lost(Some(&err));
        policy.request_failed(&TransportError::Timeout);
    }
}
