//! HTTP transport for the engagement platform.

use std::time::Duration;

use async_trait::async_trait;
use engage_core::{
    ChannelKey, Event, FetchQuery, Identity, SessionHandle, Token, Transport, TransportError,
    UserAttributes, WireMessage,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::protocol::{
    API_KEY_HEADER, ApiResponse, BindIdentityRequest, FetchMessagesRequest, MessagesResponse,
    OpenSessionRequest, OpenSessionResponse, SESSION_HEADER, SyncMessagesRequest,
    TrackEventRequest, UpdateUserRequest, paths,
};

const fn default_timeout_secs() -> u64 {
    30
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Platform base URL, e.g. `https://api.example.com`.
    pub base_url: String,
    pub api_key: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// JSON-over-HTTP [`Transport`].
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::Client,
}

fn network(e: &reqwest::Error) -> TransportError {
    if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| network(&e))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<B, R>(
        &self,
        path: &str,
        session: Option<&SessionHandle>,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<R, TransportError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, &session.session_id);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| network(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse>(&body)
                .map(|r| r.msg)
                .unwrap_or(body);
            tracing::debug!(path, status = status.as_u16(), "Platform request failed");
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(|e| network(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post_ack<B>(
        &self,
        path: &str,
        session: &SessionHandle,
        body: &B,
    ) -> Result<(), TransportError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.post::<B, ApiResponse>(path, Some(session), None, body)
            .await?
            .into_result()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_session(
        &self,
        token: Token,
        package_name: &str,
    ) -> Result<SessionHandle, TransportError> {
        let request = OpenSessionRequest {
            package_name: package_name.to_string(),
        };
        let token = token.into_value();
        let response: OpenSessionResponse = self
            .post(paths::OPEN_SESSION, None, Some(&token), &request)
            .await?;
        Ok(SessionHandle::new(response.session_id))
    }

    async fn bind_identity(
        &self,
        session: &SessionHandle,
        identity: &Identity,
    ) -> Result<(), TransportError> {
        let request = BindIdentityRequest {
            user_key: identity.to_string(),
        };
        self.post_ack(paths::BIND_IDENTITY, session, &request).await
    }

    async fn send_user_patch(
        &self,
        session: &SessionHandle,
        patch: &UserAttributes,
    ) -> Result<(), TransportError> {
        let request = UpdateUserRequest {
            data_fields: patch.clone(),
        };
        self.post_ack(paths::UPDATE_USER, session, &request).await
    }

    async fn send_event(
        &self,
        session: &SessionHandle,
        event: &Event,
    ) -> Result<(), TransportError> {
        self.post_ack(paths::TRACK_EVENT, session, &TrackEventRequest::from(event))
            .await
    }

    async fn fetch_messages(
        &self,
        session: &SessionHandle,
        query: &FetchQuery,
    ) -> Result<Vec<WireMessage>, TransportError> {
        let response: MessagesResponse = self
            .post(
                paths::FETCH_MESSAGES,
                Some(session),
                None,
                &FetchMessagesRequest::from(query),
            )
            .await?;
        Ok(response.messages)
    }

    async fn sync_message_set(
        &self,
        session: &SessionHandle,
        channel: &ChannelKey,
    ) -> Result<Vec<WireMessage>, TransportError> {
        let request = SyncMessagesRequest {
            channel: channel.clone(),
        };
        let response: MessagesResponse = self
            .post(paths::SYNC_MESSAGES, Some(session), None, &request)
            .await?;
        Ok(response.messages)
    }
}
