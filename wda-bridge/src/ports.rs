//! Collaborator seams.
//!
//! The bus, group bookkeeping, device-health notifier and process lifecycle
//! live outside the bridge. The bridge only sees these traits, so tests can
//! inject stubs and the unit binary can wire in its own implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FatalReason;
use crate::facts::{Destination, Fact};

/// Publishes facts to the message bus. Fire-and-forget.
pub trait FactSink: Send + Sync {
    fn send(&self, destination: Destination, fact: Fact);
}

/// Device-health reporting.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn set_device_temporary_unavailable(&self, reason: &str);
    fn set_device_absent(&self, reason: &str);
}

/// Process termination hook.
///
/// Implementations are expected to end the process; the supervisor that
/// restarts the unit is outside this crate. Tests use a recording stub.
#[cfg_attr(test, mockall::automock)]
pub trait Lifecycle: Send + Sync {
    fn fatal(&self, reason: &FatalReason);
}

/// The group this device currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Channel the group's subscribers listen on.
    pub group: String,
    /// Owner of the group, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Group membership lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    Joined(GroupInfo),
    Left,
}

/// Resolves the current group membership.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn current(&self) -> Option<GroupInfo>;
}
