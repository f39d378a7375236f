//! Core traits for token issuance and platform transport.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ChannelKey, Event, FetchQuery, Identity, Token, TokenError, UserAttributes, WireMessage};

/// Handle to an opened platform session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    /// Platform-assigned session identifier.
    pub session_id: String,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Supplies authentication tokens for an identity.
///
/// Implemented by the embedding application. Invoked once per
/// initialization attempt; tokens are never cached by the client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Issue a fresh token for `identity`.
    async fn issue_token(&self, identity: &Identity) -> Result<Token, TokenError>;
}

/// Token provider backed by an async closure.
pub struct FnTokenProvider<F>(F);

/// Wrap an async closure as a [`TokenProvider`].
///
/// # Example
/// ```ignore
/// let provider = token_provider_fn(|identity| async move {
///     Ok(Token::new(sign_jwt(&identity)?, identity))
/// });
/// ```
pub fn token_provider_fn<F, Fut>(f: F) -> FnTokenProvider<F>
where
    F: Fn(Identity) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send,
{
    FnTokenProvider(f)
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn(Identity) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send,
{
    async fn issue_token(&self, identity: &Identity) -> Result<Token, TokenError> {
        (self.0)(identity.clone()).await
    }
}

/// Trait for the remote platform transport.
///
/// Every call is a single round trip; implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchange a token for a platform session. Consumes the token.
    async fn open_session(
        &self,
        token: Token,
        package_name: &str,
    ) -> Result<SessionHandle, TransportError>;

    /// Bind the user identity to an opened session.
    async fn bind_identity(
        &self,
        session: &SessionHandle,
        identity: &Identity,
    ) -> Result<(), TransportError>;

    /// Send an additive user attribute patch.
    async fn send_user_patch(
        &self,
        session: &SessionHandle,
        patch: &UserAttributes,
    ) -> Result<(), TransportError>;

    /// Send a behavioral event.
    async fn send_event(&self, session: &SessionHandle, event: &Event)
    -> Result<(), TransportError>;

    /// Pull up to `query.count` ephemeral message candidates.
    async fn fetch_messages(
        &self,
        session: &SessionHandle,
        query: &FetchQuery,
    ) -> Result<Vec<WireMessage>, TransportError>;

    /// Fetch the full current message set for a persistent channel.
    async fn sync_message_set(
        &self,
        session: &SessionHandle,
        channel: &ChannelKey,
    ) -> Result<Vec<WireMessage>, TransportError>;
}
