//! Cached message set with change broadcast.

use std::sync::{PoisonError, RwLock};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{ChannelKey, MessageSet};

/// Change notification capacity per store.
const CHANGE_CAPACITY: usize = 64;

/// Published whenever a sync replaces the cached set with different content.
#[derive(Debug, Clone, PartialEq)]
pub struct SetChanged {
    pub channel: ChannelKey,
    /// The new cached set.
    pub set: MessageSet,
    /// Ids new in this set.
    pub added: Vec<String>,
    /// Ids no longer present.
    pub removed: Vec<String>,
}

/// Message set cache with broadcast change notification.
///
/// Observers subscribe independently of the sync call, so any number of
/// them can react to a change without triggering network I/O.
pub struct MessageSetStore {
    channel: ChannelKey,
    current: RwLock<MessageSet>,
    sender: broadcast::Sender<SetChanged>,
}

impl MessageSetStore {
    /// Create an empty store for a channel.
    #[must_use]
    pub fn new(channel: ChannelKey) -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            channel,
            current: RwLock::new(MessageSet::default()),
            sender,
        }
    }

    #[must_use]
    pub const fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    /// Get a snapshot of the cached set.
    #[must_use]
    pub fn snapshot(&self) -> MessageSet {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the cached set wholesale.
    ///
    /// Returns `true` and notifies subscribers if the content changed.
    pub fn replace(&self, set: MessageSet) -> bool {
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if *current == set {
                return false;
            }
            std::mem::replace(&mut *current, set.clone())
        };

        let (added, removed) = set.diff(&previous);
        tracing::debug!(
            channel = %self.channel,
            size = set.len(),
            added = added.len(),
            removed = removed.len(),
            "Message set changed"
        );

        // No receivers is fine.
        let _ = self.sender.send(SetChanged {
            channel: self.channel.clone(),
            set,
            added,
            removed,
        });
        true
    }

    /// Get a receiver for change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SetChanged> {
        self.sender.subscribe()
    }

    /// Stream of change notifications.
    ///
    /// A slow consumer that lags skips the missed notifications; the latest
    /// `SetChanged` always carries the full set.
    #[must_use]
    pub fn changes(&self) -> futures::stream::BoxStream<'static, SetChanged> {
        let channel = self.channel.clone();
        BroadcastStream::new(self.subscribe())
            .filter_map(move |res| {
                let channel = channel.clone();
                async move {
                    match res {
                        Ok(change) => Some(change),
                        Err(e) => {
                            tracing::warn!(%channel, "Change subscriber lagged: {e}");
                            None
                        }
                    }
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::PersistentMessage;

    fn set(ids: &[&str]) -> MessageSet {
        ids.iter()
            .map(|id| PersistentMessage {
                id: (*id).to_string(),
                elements: None,
                payload: json!({}),
            })
            .collect()
    }

    #[test]
    fn test_starts_empty() {
        let store = MessageSetStore::new(ChannelKey::new("feed"));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_replace_notifies_with_diff() {
        let store = MessageSetStore::new(ChannelKey::new("feed"));
        let mut rx = store.subscribe();

        assert!(store.replace(set(&["a", "b"])));
        assert!(store.replace(set(&["b", "c"])));

        let first = tokio_test::assert_ok!(rx.try_recv());
        assert_eq!(first.added, vec!["a", "b"]);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.set.ids(), vec!["b", "c"]);
        assert_eq!(second.added, vec!["c"]);
        assert_eq!(second.removed, vec!["a"]);
    }

    #[test]
    fn test_identical_replace_is_silent() {
        let store = MessageSetStore::new(ChannelKey::new("feed"));
        store.replace(set(&["a"]));
        let mut rx = store.subscribe();

        assert!(!store.replace(set(&["a"])));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_changes_stream() {
        let store = MessageSetStore::new(ChannelKey::new("feed"));
        let mut changes = store.changes();

        store.replace(set(&["m1"]));
        store.replace(MessageSet::default());

        let first = changes.next().await.unwrap();
        assert_eq!(first.set.ids(), vec!["m1"]);
        let second = changes.next().await.unwrap();
        assert!(second.set.is_empty());
        assert_eq!(second.removed, vec!["m1"]);
    }
}
