//! In-memory platform transport.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use engage_core::{
    ChannelKey, Event, FetchQuery, Identity, SessionHandle, Token, Transport, TransportError,
    UserAttributes, WireMessage,
};
use uuid::Uuid;

/// Transport operation, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    OpenSession,
    BindIdentity,
    SendUserPatch,
    SendEvent,
    FetchMessages,
    SyncMessageSet,
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    OpenSession { token: String, package_name: String },
    BindIdentity(Identity),
    SendUserPatch(UserAttributes),
    SendEvent(Event),
    FetchMessages(FetchQuery),
    SyncMessageSet(ChannelKey),
}

impl TransportCall {
    const fn operation(&self) -> Operation {
        match self {
            Self::OpenSession { .. } => Operation::OpenSession,
            Self::BindIdentity(_) => Operation::BindIdentity,
            Self::SendUserPatch(_) => Operation::SendUserPatch,
            Self::SendEvent(_) => Operation::SendEvent,
            Self::FetchMessages(_) => Operation::FetchMessages,
            Self::SyncMessageSet(_) => Operation::SyncMessageSet,
        }
    }
}

#[derive(Default)]
struct Inner {
    calls: Vec<TransportCall>,
    failures: HashMap<Operation, TransportError>,
    candidates: Vec<WireMessage>,
    sets: HashMap<ChannelKey, Vec<WireMessage>>,
    profile: UserAttributes,
    open_delay: Option<Duration>,
}

/// Scripted in-memory platform.
///
/// Records every call, applies user patches additively to a single profile,
/// and serves whatever messages were last scripted. Useful for development
/// and tests. Nothing survives the process.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    /// Create a new in-memory transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call, then fail it if a failure is scripted for its operation.
    fn record(&self, call: TransportCall) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let op = call.operation();
        inner.calls.push(call);
        inner.failures.get(&op).cloned().map_or(Ok(()), Err)
    }

    /// Script the candidates returned by `fetch_messages`.
    pub fn set_candidates(&self, candidates: Vec<WireMessage>) {
        self.lock().candidates = candidates;
    }

    /// Script the set returned by `sync_message_set` for `channel`.
    pub fn set_message_set(&self, channel: &ChannelKey, messages: Vec<WireMessage>) {
        self.lock().sets.insert(channel.clone(), messages);
    }

    /// Make every call of `op` fail with `error` until recovered.
    pub fn fail(&self, op: Operation, error: TransportError) {
        self.lock().failures.insert(op, error);
    }

    pub fn recover(&self, op: Operation) {
        self.lock().failures.remove(&op);
    }

    /// Delay `open_session` to widen the initialization window.
    pub fn set_open_delay(&self, delay: Duration) {
        self.lock().open_delay = Some(delay);
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, op: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .count()
    }

    /// Token values consumed by `open_session`, in order.
    #[must_use]
    pub fn opened_tokens(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::OpenSession { token, .. } => Some(token.clone()),
                _ => None,
            })
            .collect()
    }

    /// Server-side profile after all accepted patches.
    #[must_use]
    pub fn profile(&self) -> UserAttributes {
        self.lock().profile.clone()
    }

    /// Events accepted so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::SendEvent(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_session(
        &self,
        token: Token,
        package_name: &str,
    ) -> Result<SessionHandle, TransportError> {
        let delay = self.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.record(TransportCall::OpenSession {
            token: token.into_value(),
            package_name: package_name.to_string(),
        })?;
        Ok(SessionHandle::new(Uuid::new_v4().to_string()))
    }

    async fn bind_identity(
        &self,
        _session: &SessionHandle,
        identity: &Identity,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::BindIdentity(identity.clone()))
    }

    async fn send_user_patch(
        &self,
        _session: &SessionHandle,
        patch: &UserAttributes,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SendUserPatch(patch.clone()))?;
        let mut inner = self.lock();
        for (name, value) in patch.iter() {
            inner.profile.set(name, value.clone());
        }
        Ok(())
    }

    async fn send_event(
        &self,
        _session: &SessionHandle,
        event: &Event,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SendEvent(event.clone()))
    }

    async fn fetch_messages(
        &self,
        _session: &SessionHandle,
        query: &FetchQuery,
    ) -> Result<Vec<WireMessage>, TransportError> {
        self.record(TransportCall::FetchMessages(*query))?;
        let count = usize::try_from(query.count).unwrap_or(usize::MAX);
        Ok(self.lock().candidates.iter().take(count).cloned().collect())
    }

    async fn sync_message_set(
        &self,
        _session: &SessionHandle,
        channel: &ChannelKey,
    ) -> Result<Vec<WireMessage>, TransportError> {
        self.record(TransportCall::SyncMessageSet(channel.clone()))?;
        Ok(self.lock().sets.get(channel).cloned().unwrap_or_default())
    }
}
