//! Wire protocol for client-platform communication.
//!
//! Every call is a JSON `POST`. The API key travels in [`API_KEY_HEADER`];
//! after a session is opened, its id travels in [`SESSION_HEADER`]. The
//! token is sent once, as a bearer credential on the open call.

use std::collections::BTreeMap;

use engage_core::{
    AttributeValue, ChannelKey, DisplayPolicy, Event, FetchQuery, TransportError, UserAttributes,
    WireMessage,
};
use serde::{Deserialize, Serialize};

/// Header carrying the platform API key.
pub const API_KEY_HEADER: &str = "Api-Key";
/// Header carrying the opened session id.
pub const SESSION_HEADER: &str = "Session-Id";

/// Endpoint paths, relative to the platform base URL.
pub mod paths {
    pub const OPEN_SESSION: &str = "/api/sessions/open";
    pub const BIND_IDENTITY: &str = "/api/sessions/identity";
    pub const UPDATE_USER: &str = "/api/users/update";
    pub const TRACK_EVENT: &str = "/api/events/track";
    pub const FETCH_MESSAGES: &str = "/api/messages/fetch";
    pub const SYNC_MESSAGES: &str = "/api/messages/sync";
}

/// `code` value of a successful [`ApiResponse`].
pub const SUCCESS_CODE: &str = "Success";

/// Generic acknowledgment body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
}

impl ApiResponse {
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE.to_string(),
            msg: String::new(),
        }
    }

    #[must_use]
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            msg: msg.into(),
        }
    }

    /// Map a non-success code to `TransportError::Rejected`.
    ///
    /// # Errors
    /// Returns `Rejected` if `code` is not [`SUCCESS_CODE`].
    pub fn into_result(self) -> Result<(), TransportError> {
        if self.code == SUCCESS_CODE {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("{}: {}", self.code, self.msg)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    pub package_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindIdentityRequest {
    pub user_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub data_fields: UserAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEventRequest {
    pub event_id: String,
    pub event_name: String,
    #[serde(default)]
    pub data_fields: BTreeMap<String, AttributeValue>,
    pub created_at: u64,
}

impl From<&Event> for TrackEventRequest {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id().to_string(),
            event_name: event.name().to_string(),
            data_fields: event.fields().clone(),
            created_at: event.created_at(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMessagesRequest {
    pub count: u32,
    pub display_policy: DisplayPolicy,
}

impl From<&FetchQuery> for FetchMessagesRequest {
    fn from(query: &FetchQuery) -> Self {
        Self {
            count: query.count,
            display_policy: query.display_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessagesRequest {
    pub channel: ChannelKey,
}

/// Body of fetch and sync responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}
