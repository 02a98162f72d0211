//! In-process group membership.
//!
//! The unit is in at most one group at a time. Joins and leaves are
//! broadcast so the log capture can follow membership.

use std::sync::Arc;

use parking_lot::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;
use wda_bridge::ports::{GroupEvent, GroupInfo, GroupResolver};

const CHANNEL_CAPACITY: usize = 16;

pub type SharedGroup = Arc<LocalGroup>;

pub struct LocalGroup {
    current: Mutex<Option<GroupInfo>>,
    events: broadcast::Sender<GroupEvent>,
}

impl LocalGroup {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(None),
            events,
        }
    }

    pub fn shared(self) -> SharedGroup {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    pub fn join(&self, info: GroupInfo) {
        info!(group = %info.group, owner = ?info.owner, "Device joined group");
        *self.current.lock() = Some(info.clone());
        let _ = self.events.send(GroupEvent::Joined(info));
    }

    /// Leave the current group. Returns false when there was none.
    pub fn leave(&self) -> bool {
        let previous = self.current.lock().take();
        let Some(previous) = previous else {
            return false;
        };
        info!(group = %previous.group, "Device left group");
        let _ = self.events.send(GroupEvent::Left);
        true
    }

    pub fn get(&self) -> Option<GroupInfo> {
        self.current.lock().clone()
    }
}

impl Default for LocalGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupResolver for LocalGroup {
    async fn current(&self) -> Option<GroupInfo> {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> GroupInfo {
        GroupInfo {
            group: name.to_string(),
            owner: Some("alice@example.com".into()),
        }
    }

    #[tokio::test]
    async fn join_then_leave_broadcasts_both() {
        let group = LocalGroup::new();
        let mut rx = group.subscribe();

        group.join(info("g1"));
        assert_eq!(group.current().await.unwrap().group, "g1");
        assert!(group.leave());
        assert!(group.current().await.is_none());

        assert_eq!(rx.recv().await.unwrap(), GroupEvent::Joined(info("g1")));
        assert_eq!(rx.recv().await.unwrap(), GroupEvent::Left);
    }

    #[tokio::test]
    async fn leave_without_group_is_silent() {
        let group = LocalGroup::new();
        let mut rx = group.subscribe();

        assert!(!group.leave());
        assert!(rx.try_recv().is_err());
    }
}
