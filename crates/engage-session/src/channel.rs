//! Message channels: pull-once and sync-and-cache retrieval.

use std::{marker::PhantomData, sync::Arc};

use engage_core::{
    ChannelKey, EphemeralMessage, FetchQuery, MessageSet, MessageSetStore, PersistentMessage,
    SetChanged, WireMessage, WireMessageError, WorkingView,
};
use tokio::sync::broadcast;

use crate::{SessionError, SessionManager};

mod sealed {
    pub trait Sealed {}
}

/// Message variant a channel retrieves.
pub trait ChannelKind: sealed::Sealed + Send + Sync + 'static {
    /// Validated message type produced by the channel.
    type Message: TryFrom<WireMessage, Error = WireMessageError> + Send;
    /// Per-channel state.
    type State: Send + Sync;
}

/// Pull-once retrieval. Nothing is retained.
#[derive(Debug)]
pub enum Ephemeral {}

/// Sync-and-cache retrieval.
#[derive(Debug)]
pub enum Persistent {}

impl sealed::Sealed for Ephemeral {}
impl sealed::Sealed for Persistent {}

impl ChannelKind for Ephemeral {
    type Message = EphemeralMessage;
    type State = ();
}

impl ChannelKind for Persistent {
    type Message = PersistentMessage;
    type State = MessageSetStore;
}

/// Message retrieval channel for one message variant.
pub struct MessageChannel<K: ChannelKind> {
    session: Arc<SessionManager>,
    state: K::State,
    _kind: PhantomData<K>,
}

impl<K: ChannelKind> MessageChannel<K> {
    /// Validate wire messages, skipping any that are malformed.
    fn validate(wire: Vec<WireMessage>) -> impl Iterator<Item = K::Message> {
        wire.into_iter().filter_map(|raw| match K::Message::try_from(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Skipping malformed message: {e}");
                None
            }
        })
    }
}

impl MessageChannel<Ephemeral> {
    #[must_use]
    pub const fn ephemeral(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            state: (),
            _kind: PhantomData,
        }
    }

    /// Fetch a fresh message. Always a new round trip; never cached.
    ///
    /// Returns `Ok(None)` when the platform has nothing to show.
    ///
    /// # Errors
    /// Returns `NotReady` before the session is ready, `InvalidInput` for a
    /// zero count, or `Transport` if the fetch fails.
    pub async fn fetch_one(
        &self,
        query: FetchQuery,
    ) -> Result<Option<EphemeralMessage>, SessionError> {
        let handle = self.session.ready_handle()?;
        if query.count == 0 {
            return Err(SessionError::InvalidInput(
                "fetch count must be at least 1".to_string(),
            ));
        }

        let candidates = self
            .session
            .transport()
            .fetch_messages(&handle, &query)
            .await
            .map_err(|e| {
                tracing::warn!(count = query.count, "Message fetch failed: {e}");
                SessionError::Transport(e)
            })?;

        let received = candidates.len();
        let message = Self::validate(candidates).next();
        tracing::debug!(
            received,
            display_policy = ?query.display_policy,
            message_id = message.as_ref().map(|m| m.id.as_str()),
            "Fetched messages"
        );
        Ok(message)
    }
}

impl MessageChannel<Persistent> {
    #[must_use]
    pub fn persistent(session: Arc<SessionManager>, channel: ChannelKey) -> Self {
        Self {
            session,
            state: MessageSetStore::new(channel),
            _kind: PhantomData,
        }
    }

    #[must_use]
    pub const fn channel_key(&self) -> &ChannelKey {
        self.state.channel()
    }

    /// Replace the cached set with the platform's current set.
    ///
    /// On failure the cached set is left as it was.
    ///
    /// # Errors
    /// Returns `NotReady` before the session is ready, or `Transport` if the
    /// sync fails.
    pub async fn sync(&self) -> Result<(), SessionError> {
        let handle = self.session.ready_handle()?;
        let channel = self.state.channel();

        let wire = self
            .session
            .transport()
            .sync_message_set(&handle, channel)
            .await
            .map_err(|e| {
                tracing::warn!(%channel, "Message sync failed: {e}");
                SessionError::Transport(e)
            })?;

        let set = MessageSet::from_messages(Self::validate(wire));
        let size = set.len();
        let changed = self.state.replace(set);
        tracing::debug!(%channel, size, changed, "Message set synced");
        Ok(())
    }

    /// Cached set from the last successful sync. Never does I/O.
    #[must_use]
    pub fn get_all(&self) -> MessageSet {
        self.state.snapshot()
    }

    /// Working view over the cached set.
    #[must_use]
    pub fn working_view(&self) -> WorkingView {
        WorkingView::from_set(&self.state.snapshot())
    }

    /// Hide a message from `view`.
    ///
    /// Only the caller's view changes: the cached set keeps the message and
    /// the platform is not told, so a later sync may bring it back.
    pub fn dismiss(&self, view: &mut WorkingView, id: &str) -> bool {
        let removed = view.dismiss(id);
        tracing::debug!(channel = %self.state.channel(), message_id = id, removed, "Message dismissed locally");
        removed
    }

    /// Receive a notification whenever a sync changes the cached set.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SetChanged> {
        self.state.subscribe()
    }

    /// Stream of set changes.
    #[must_use]
    pub fn changes(&self) -> futures::stream::BoxStream<'static, SetChanged> {
        self.state.changes()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use engage_core::{
        DisplayPolicy, Identity, SessionConfig, Token, TokenProvider, Transport, TransportError,
        project, token_provider_fn,
    };
    use serde_json::json;

    use super::*;
    use crate::{
        SessionStatus,
        memory::{MemoryTransport, Operation, TransportCall},
    };

    fn provider() -> Arc<dyn TokenProvider> {
        Arc::new(token_provider_fn(|identity: Identity| async move {
            Ok(Token::new("token", identity))
        }))
    }

    fn manager(transport: &Arc<MemoryTransport>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            provider(),
            Arc::clone(transport) as Arc<dyn Transport>,
        ))
    }

    fn config() -> SessionConfig {
        SessionConfig::new(Identity::new("alice@example.com").unwrap(), "web-demo")
    }

    async fn ready_manager(transport: &Arc<MemoryTransport>) -> Arc<SessionManager> {
        let manager = manager(transport);
        manager.initialize(config()).await.unwrap();
        manager
    }

    async fn assert_rejected(manager: &Arc<SessionManager>, status: SessionStatus) {
        let ephemeral = MessageChannel::ephemeral(Arc::clone(manager));
        let persistent = MessageChannel::persistent(Arc::clone(manager), feed());
        assert_eq!(
            ephemeral.fetch_one(FetchQuery::default()).await,
            Err(SessionError::NotReady(status))
        );
        assert_eq!(
            persistent.sync().await,
            Err(SessionError::NotReady(status))
        );
        assert!(persistent.get_all().is_empty());
    }

    fn wire(id: &str) -> WireMessage {
        serde_json::from_value(json!({
            "messageId": id,
            "elements": {
                "title": format!("Title {id}"),
                "buttons": [{"id": "close", "title": "Close"}]
            }
        }))
        .unwrap()
    }

    fn feed() -> ChannelKey {
        ChannelKey::new("home-feed")
    }

    #[tokio::test]
    async fn test_not_ready_makes_no_call() {
        let transport = Arc::new(MemoryTransport::new());
        let manager = manager(&transport);
        let ephemeral = MessageChannel::ephemeral(Arc::clone(&manager));
        let persistent = MessageChannel::persistent(manager, feed());

        assert_eq!(
            ephemeral.fetch_one(FetchQuery::default()).await,
            Err(SessionError::NotReady(SessionStatus::Uninitialized))
        );
        assert_eq!(
            persistent.sync().await,
            Err(SessionError::NotReady(SessionStatus::Uninitialized))
        );
        assert!(persistent.get_all().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_while_initializing() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_open_delay(Duration::from_millis(100));
        let manager = manager(&transport);
        let pending = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.initialize(config()).await }
        });
        manager
            .subscribe()
            .wait_for(|s| s.status == SessionStatus::Initializing)
            .await
            .unwrap();

        assert_rejected(&manager, SessionStatus::Initializing).await;
        assert!(transport.calls().is_empty());

        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejected_after_failed_init() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail(Operation::BindIdentity, TransportError::Network("down".into()));
        let manager = manager(&transport);
        assert!(manager.initialize(config()).await.is_err());
        let calls_before = transport.calls().len();

        assert_rejected(&manager, SessionStatus::Failed).await;
        assert_eq!(transport.calls().len(), calls_before);
        assert_eq!(transport.call_count(Operation::FetchMessages), 0);
        assert_eq!(transport.call_count(Operation::SyncMessageSet), 0);
    }

    #[tokio::test]
    async fn test_fetch_one_empty_vs_error() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::ephemeral(ready_manager(&transport).await);

        assert_eq!(channel.fetch_one(FetchQuery::default()).await, Ok(None));

        transport.fail(Operation::FetchMessages, TransportError::Network("reset".into()));
        assert!(matches!(
            channel.fetch_one(FetchQuery::default()).await,
            Err(SessionError::Transport(TransportError::Network(_)))
        ));
    }

    #[tokio::test]
    async fn test_fetch_one_is_never_cached() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::ephemeral(ready_manager(&transport).await);

        transport.set_candidates(vec![wire("p1")]);
        let first = channel.fetch_one(FetchQuery::default()).await.unwrap().unwrap();
        assert_eq!(first.id, "p1");

        transport.set_candidates(vec![]);
        assert_eq!(channel.fetch_one(FetchQuery::default()).await, Ok(None));
        assert_eq!(transport.call_count(Operation::FetchMessages), 2);
    }

    #[tokio::test]
    async fn test_fetch_one_skips_malformed_and_forwards_policy() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::ephemeral(ready_manager(&transport).await);
        transport.set_candidates(vec![WireMessage::default(), wire("p2")]);

        let query = FetchQuery::new(5).with_display_policy(DisplayPolicy::Immediate);
        let message = channel.fetch_one(query).await.unwrap().unwrap();

        assert_eq!(message.id, "p2");
        assert!(transport.calls().contains(&TransportCall::FetchMessages(query)));
    }

    #[tokio::test]
    async fn test_fetch_zero_count_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::ephemeral(ready_manager(&transport).await);
        assert!(matches!(
            channel.fetch_one(FetchQuery::new(0)).await,
            Err(SessionError::InvalidInput(_))
        ));
        assert_eq!(transport.call_count(Operation::FetchMessages), 0);
    }

    #[tokio::test]
    async fn test_sync_replaces_not_merges() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());

        transport.set_message_set(&feed(), vec![wire("A"), wire("B")]);
        channel.sync().await.unwrap();
        assert_eq!(channel.get_all().ids(), vec!["A", "B"]);

        transport.set_message_set(&feed(), vec![wire("C"), wire("B")]);
        channel.sync().await.unwrap();
        assert_eq!(channel.get_all().ids(), vec!["C", "B"]);
    }

    #[tokio::test]
    async fn test_sync_single_then_empty() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());

        transport.set_message_set(&feed(), vec![wire("m1")]);
        channel.sync().await.unwrap();
        assert_eq!(channel.get_all().ids(), vec!["m1"]);

        transport.set_message_set(&feed(), vec![]);
        channel.sync().await.unwrap();
        assert!(channel.get_all().is_empty());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_cache() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        transport.set_message_set(&feed(), vec![wire("A")]);
        channel.sync().await.unwrap();

        transport.set_message_set(&feed(), vec![wire("Z")]);
        transport.fail(
            Operation::SyncMessageSet,
            TransportError::Status {
                status: 500,
                message: "boom".into(),
            },
        );
        assert!(matches!(
            channel.sync().await,
            Err(SessionError::Transport(_))
        ));
        assert_eq!(channel.get_all().ids(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_get_all_does_no_io() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        let before = transport.calls().len();

        let _ = channel.get_all();
        let _ = channel.get_all();

        assert_eq!(transport.calls().len(), before);
    }

    #[tokio::test]
    async fn test_dismiss_is_local() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        transport.set_message_set(&feed(), vec![wire("A"), wire("B")]);
        channel.sync().await.unwrap();
        let calls_before = transport.calls().len();

        let mut view = channel.working_view();
        assert!(channel.dismiss(&mut view, "B"));

        assert!(channel.get_all().contains("B"));
        assert!(!view.contains("B"));
        assert_eq!(transport.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_dismiss_button_dispatch() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        transport.set_message_set(&feed(), vec![wire("A")]);
        channel.sync().await.unwrap();

        let mut view = channel.working_view();
        let tree = project(&view.messages()[0]).unwrap();
        let dispatch = tree.dispatch("close").unwrap();

        assert_eq!(view.apply(dispatch), None);
        assert!(view.is_empty());
        assert_eq!(channel.get_all().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_notifies_observers_on_change() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        transport.set_message_set(&feed(), vec![wire("A")]);
        channel.sync().await.unwrap();
        channel.sync().await.unwrap();

        let change = first.try_recv().unwrap();
        assert_eq!(change.channel, feed());
        assert_eq!(change.added, vec!["A"]);
        assert_eq!(second.try_recv().unwrap(), change);

        // unchanged second sync
        assert!(first.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_members_dropped_at_boundary() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = MessageChannel::persistent(ready_manager(&transport).await, feed());
        let no_elements = WireMessage {
            message_id: Some("bare".into()),
            ..WireMessage::default()
        };
        transport.set_message_set(&feed(), vec![
            wire("A"),
            WireMessage::default(),
            no_elements,
            wire("A"),
        ]);

        channel.sync().await.unwrap();

        let set = channel.get_all();
        assert_eq!(set.ids(), vec!["A", "bare"]);
        assert!(project(set.get("bare").unwrap()).is_none());
    }
}
