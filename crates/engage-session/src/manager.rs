//! Session manager owning the session lifecycle.

use std::sync::{Arc, Mutex, PoisonError};

use engage_core::{
    Identity, SessionConfig, SessionHandle, TokenProvider, Transport, identity::now_secs,
};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{ErrorInfo, InitStage, SessionError};

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// `initialize` has not been called.
    #[default]
    Uninitialized,
    /// Token exchange, open or bind in progress.
    Initializing,
    /// Identity bound; channels are usable.
    Ready,
    /// Initialization failed. Terminal.
    Failed,
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub status: SessionStatus,
    /// Bound identity, set once `Ready`.
    pub identity: Option<Identity>,
    /// Failure details, set once `Failed`.
    pub error: Option<ErrorInfo>,
    pub(crate) handle: Option<SessionHandle>,
}

/// The one initialization attempt, shared by every caller.
type Attempt = Shared<BoxFuture<'static, Result<(), SessionError>>>;

struct Inner {
    token_provider: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
    state: watch::Sender<Session>,
}

/// Session manager for one identity.
///
/// Constructed explicitly and shared via `Arc` with the channels that
/// depend on it.
pub struct SessionManager {
    inner: Arc<Inner>,
    attempt: Mutex<Option<Attempt>>,
}

impl SessionManager {
    /// Create a new, uninitialized session manager.
    #[must_use]
    pub fn new(token_provider: Arc<dyn TokenProvider>, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                token_provider,
                transport,
                state,
            }),
            attempt: Mutex::new(None),
        }
    }

    /// Initialize the session: issue a token, open the session, bind the
    /// identity.
    ///
    /// At most one attempt ever runs, on its own task. Calls made while it is
    /// in flight wait for it and receive its outcome; later calls return the
    /// terminal outcome immediately. Only the first caller's config is used.
    /// Dropping a caller (e.g. on a timeout) does not cancel the attempt.
    ///
    /// # Errors
    /// Returns `SessionError::Auth` if any step fails. No step is retried.
    pub async fn initialize(&self, config: SessionConfig) -> Result<(), SessionError> {
        let attempt = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| self.start(config))
            .clone();
        attempt.await
    }

    fn start(&self, config: SessionConfig) -> Attempt {
        self.inner
            .state
            .send_modify(|s| s.status = SessionStatus::Initializing);

        let task = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            async move { inner.run_initialize(config).await }
        });

        let inner = Arc::clone(&self.inner);
        task.map(move |joined| {
            joined.unwrap_or_else(|e| {
                let info = ErrorInfo::new(InitStage::Aborted, e);
                tracing::error!("Session initialization task aborted: {}", info.message);
                Err(inner.fail(info))
            })
        })
        .boxed()
        .shared()
    }

    /// Get a snapshot of the session. Never blocks.
    #[must_use]
    pub fn status(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Observe session transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().status == SessionStatus::Ready
    }

    /// Bound identity, once ready.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity.clone()
    }

    /// Handle of the ready session, or `NotReady`.
    pub(crate) fn ready_handle(&self) -> Result<SessionHandle, SessionError> {
        let state = self.inner.state.borrow();
        match (&state.status, &state.handle) {
            (SessionStatus::Ready, Some(handle)) => Ok(handle.clone()),
            (status, _) => Err(SessionError::NotReady(*status)),
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }
}

impl Inner {
    async fn run_initialize(&self, config: SessionConfig) -> Result<(), SessionError> {
        tracing::info!(identity = %config.identity, package = %config.package_name, "Initializing session");

        match self.establish(&config).await {
            Ok(handle) => {
                tracing::info!(
                    identity = %config.identity,
                    session_id = %handle.session_id,
                    "Session ready"
                );
                self.state.send_modify(|s| {
                    s.status = SessionStatus::Ready;
                    s.identity = Some(config.identity);
                    s.handle = Some(handle);
                });
                Ok(())
            }
            Err(info) => {
                tracing::warn!(identity = %config.identity, stage = ?info.stage, "Session initialization failed: {}", info.message);
                Err(self.fail(info))
            }
        }
    }

    fn fail(&self, info: ErrorInfo) -> SessionError {
        self.state.send_modify(|s| {
            s.status = SessionStatus::Failed;
            s.error = Some(info.clone());
        });
        SessionError::Auth(info)
    }

    async fn establish(&self, config: &SessionConfig) -> Result<SessionHandle, ErrorInfo> {
        let token = self
            .token_provider
            .issue_token(&config.identity)
            .await
            .map_err(|e| ErrorInfo::new(InitStage::IssueToken, e))?;

        token
            .validate_for(&config.identity, now_secs())
            .map_err(|e| ErrorInfo::new(InitStage::IssueToken, e))?;

        let handle = self
            .transport
            .open_session(token, &config.package_name)
            .await
            .map_err(|e| ErrorInfo::new(InitStage::OpenSession, e))?;

        self.transport
            .bind_identity(&handle, &config.identity)
            .await
            .map_err(|e| ErrorInfo::new(InitStage::BindIdentity, e))?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use engage_core::{Token, TokenError, TransportError, token_provider_fn};

    use super::*;
    use crate::memory::{MemoryTransport, Operation};

    fn config() -> SessionConfig {
        SessionConfig::new(Identity::new("alice@example.com").unwrap(), "web-demo")
    }

    fn counting_provider(counter: Arc<AtomicUsize>) -> Arc<dyn TokenProvider> {
        Arc::new(token_provider_fn(move |identity: Identity| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Token::new(format!("token-{n}"), identity)) }
        }))
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let transport = Arc::new(MemoryTransport::new());
        let manager = SessionManager::new(
            counting_provider(Arc::default()),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );
        assert_eq!(manager.status().status, SessionStatus::Uninitialized);

        manager.initialize(config()).await.unwrap();

        let session = manager.status();
        assert_eq!(session.status, SessionStatus::Ready);
        assert_eq!(session.identity.unwrap().as_str(), "alice@example.com");
        assert!(session.error.is_none());
        assert_eq!(transport.call_count(Operation::OpenSession), 1);
        assert_eq!(transport.call_count(Operation::BindIdentity), 1);
        assert_eq!(transport.opened_tokens(), vec!["token-0".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_runs_once() {
        let tokens = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(MemoryTransport::new());
        transport.set_open_delay(Duration::from_millis(50));
        let manager = Arc::new(SessionManager::new(
            counting_provider(Arc::clone(&tokens)),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.initialize(config()).await })
            })
            .collect();
        let results = futures::future::join_all(handles).await;

        assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
        assert_eq!(tokens.load(Ordering::SeqCst), 1);
        assert_eq!(transport.call_count(Operation::OpenSession), 1);
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let tokens = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(MemoryTransport::new());
        transport.set_open_delay(Duration::from_millis(20));
        transport.fail(Operation::OpenSession, TransportError::Rejected("bad token".into()));
        let manager = SessionManager::new(
            counting_provider(Arc::clone(&tokens)),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let (a, b) = tokio::join!(manager.initialize(config()), manager.initialize(config()));

        assert_eq!(a, b);
        assert!(matches!(
            a,
            Err(SessionError::Auth(ErrorInfo { stage: InitStage::OpenSession, .. }))
        ));
        assert_eq!(tokens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let tokens = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(MemoryTransport::new());
        transport.fail(Operation::BindIdentity, TransportError::Network("down".into()));
        let manager = SessionManager::new(
            counting_provider(Arc::clone(&tokens)),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        assert!(manager.initialize(config()).await.is_err());
        transport.recover(Operation::BindIdentity);
        assert!(manager.initialize(config()).await.is_err());

        let session = manager.status();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.error.unwrap().stage, InitStage::BindIdentity);
        assert!(session.identity.is_none());
        assert_eq!(tokens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_provider_failure() {
        let transport = Arc::new(MemoryTransport::new());
        let provider = Arc::new(token_provider_fn(|_identity: Identity| async {
            Err(TokenError::Issuance("signer offline".into()))
        }));
        let manager = SessionManager::new(provider, Arc::clone(&transport) as Arc<dyn Transport>);

        let err = manager.initialize(config()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Auth(ErrorInfo { stage: InitStage::IssueToken, .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_for_wrong_identity_never_opened() {
        let transport = Arc::new(MemoryTransport::new());
        let provider = Arc::new(token_provider_fn(|_identity: Identity| async {
            Ok(Token::new("t", Identity::new("mallory@example.com").unwrap()))
        }));
        let manager = SessionManager::new(provider, Arc::clone(&transport) as Arc<dyn Transport>);

        assert!(manager.initialize(config()).await.is_err());
        assert_eq!(transport.call_count(Operation::OpenSession), 0);
    }

    #[tokio::test]
    async fn test_subscribe_observes_transitions() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_open_delay(Duration::from_millis(20));
        let manager = Arc::new(SessionManager::new(
            counting_provider(Arc::default()),
            transport as Arc<dyn Transport>,
        ));
        let mut rx = manager.subscribe();

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.initialize(config()).await })
        };

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, SessionStatus::Initializing);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, SessionStatus::Ready);

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_restart_attempt() {
        let tokens = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(MemoryTransport::new());
        transport.set_open_delay(Duration::from_millis(100));
        let manager = SessionManager::new(
            counting_provider(Arc::clone(&tokens)),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), manager.initialize(config())).await;
        assert!(timed_out.is_err());
        assert_eq!(manager.status().status, SessionStatus::Initializing);

        manager
            .subscribe()
            .wait_for(|s| s.status == SessionStatus::Ready)
            .await
            .unwrap();

        manager.initialize(config()).await.unwrap();
        assert_eq!(tokens.load(Ordering::SeqCst), 1);
        assert_eq!(transport.call_count(Operation::OpenSession), 1);
    }

    #[test]
    fn test_ready_handle_before_init() {
        let manager = SessionManager::new(
            counting_provider(Arc::default()),
            Arc::new(MemoryTransport::new()),
        );
        assert_eq!(
            manager.ready_handle(),
            Err(SessionError::NotReady(SessionStatus::Uninitialized))
        );
    }
}
