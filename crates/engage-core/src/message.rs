//! Inbound message types.
//!
//! Messages arrive from the platform as loosely typed [`WireMessage`]s and are
//! validated into [`EphemeralMessage`] or [`PersistentMessage`] at the channel
//! boundary. Everything past that point works with typed values.

use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Identifier of a persistent message feed on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the platform should also render a fetched message itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPolicy {
    /// Platform renders the message as soon as it is fetched.
    Immediate,
    /// Platform stays silent; the caller owns display.
    #[default]
    Deferred,
}

/// Pull-once query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchQuery {
    pub count: u32,
    pub display_policy: DisplayPolicy,
}

impl FetchQuery {
    #[must_use]
    pub const fn new(count: u32) -> Self {
        Self {
            count,
            display_policy: DisplayPolicy::Deferred,
        }
    }

    #[must_use]
    pub const fn with_display_policy(mut self, display_policy: DisplayPolicy) -> Self {
        self.display_policy = display_policy;
        self
    }
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Message as received from the platform, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub elements: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    /// Platform-rendered content, e.g. `{"html": "..."}` for in-app messages.
    #[serde(default)]
    pub content: Option<Value>,
}

/// Action type that removes the owning message.
const DISMISS_ACTION: &str = "dismiss";

/// Action attached to a button.
///
/// Any action type other than `dismiss` is custom and kept as received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub enum ButtonAction {
    /// Remove the owning message from the caller's view.
    #[default]
    Dismiss,
    /// Opaque to the client; forwarded to the presentation layer as-is.
    Custom { kind: String, data: Value },
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

impl From<RawAction> for ButtonAction {
    fn from(raw: RawAction) -> Self {
        match raw.kind {
            Some(kind) if kind != DISMISS_ACTION => Self::Custom {
                kind,
                data: raw.data,
            },
            _ => Self::Dismiss,
        }
    }
}

impl From<ButtonAction> for RawAction {
    fn from(action: ButtonAction) -> Self {
        match action {
            ButtonAction::Dismiss => Self {
                kind: Some(DISMISS_ACTION.to_string()),
                data: Value::Null,
            },
            ButtonAction::Custom { kind, data } => Self {
                kind: Some(kind),
                data,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub action: ButtonAction,
}

/// Structured display elements of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageElements {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

/// Content of an ephemeral message.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderablePayload {
    pub elements: Option<MessageElements>,
    pub payload: Value,
    /// Platform-rendered HTML body, usable even without `elements`.
    pub html: Option<String>,
}

/// Result of a pull-once query. Never retained by the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralMessage {
    pub id: String,
    pub content: RenderablePayload,
}

/// Member of a cached [`MessageSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentMessage {
    pub id: String,
    pub elements: Option<MessageElements>,
    /// Free-form styling and metadata.
    pub payload: Value,
}

/// Which retrieval protocol produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ephemeral,
    Persistent,
}

/// Common view over both message variants.
pub trait Message {
    fn id(&self) -> &str;
    fn kind(&self) -> MessageKind;
    fn elements(&self) -> Option<&MessageElements>;
    fn payload(&self) -> &Value;

    /// Platform-rendered HTML, when the message carries any.
    fn html(&self) -> Option<&str> {
        None
    }
}

impl Message for EphemeralMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Ephemeral
    }

    fn elements(&self) -> Option<&MessageElements> {
        self.content.elements.as_ref()
    }

    fn payload(&self) -> &Value {
        &self.content.payload
    }

    fn html(&self) -> Option<&str> {
        self.content.html.as_deref()
    }
}

impl Message for PersistentMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Persistent
    }

    fn elements(&self) -> Option<&MessageElements> {
        self.elements.as_ref()
    }

    fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Why a wire message was rejected at the channel boundary.
#[derive(Debug, Error)]
pub enum WireMessageError {
    #[error("message has no id")]
    MissingId,
    #[error("message {id} has undecodable elements: {source}")]
    Elements {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

struct Validated {
    id: String,
    elements: Option<MessageElements>,
    payload: Value,
    html: Option<String>,
}

fn validate(wire: WireMessage) -> Result<Validated, WireMessageError> {
    let id = wire
        .message_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(WireMessageError::MissingId)?;

    let elements = match wire.elements {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value(raw)
                .map_err(|source| WireMessageError::Elements { id: id.clone(), source })?,
        ),
    };

    let payload = match wire.payload {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(payload) => payload,
    };

    let html = wire
        .content
        .as_ref()
        .and_then(|content| content.get("html"))
        .and_then(Value::as_str)
        .filter(|html| !html.trim().is_empty())
        .map(str::to_string);

    Ok(Validated {
        id,
        elements,
        payload,
        html,
    })
}

impl TryFrom<WireMessage> for EphemeralMessage {
    type Error = WireMessageError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let Validated {
            id,
            elements,
            payload,
            html,
        } = validate(wire)?;
        Ok(Self {
            id,
            content: RenderablePayload {
                elements,
                payload,
                html,
            },
        })
    }
}

impl TryFrom<WireMessage> for PersistentMessage {
    type Error = WireMessageError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let Validated {
            id,
            elements,
            payload,
            ..
        } = validate(wire)?;
        Ok(Self {
            id,
            elements,
            payload,
        })
    }
}

/// Ordered, id-deduplicated collection of persistent messages.
///
/// Clones share the underlying storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSet {
    messages: Arc<[PersistentMessage]>,
}

impl MessageSet {
    /// Build a set, preserving order and keeping the first of any duplicate ids.
    pub fn from_messages(messages: impl IntoIterator<Item = PersistentMessage>) -> Self {
        let mut seen = HashSet::new();
        let messages: Vec<_> = messages
            .into_iter()
            .filter(|m| {
                let fresh = seen.insert(m.id.clone());
                if !fresh {
                    tracing::warn!(message_id = %m.id, "Dropping duplicate message id");
                }
                fresh
            })
            .collect();
        Self {
            messages: messages.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PersistentMessage> {
        self.messages.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[PersistentMessage] {
        &self.messages
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PersistentMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    /// Ids present in `self` but not in `previous`, and vice versa.
    #[must_use]
    pub fn diff(&self, previous: &Self) -> (Vec<String>, Vec<String>) {
        let added = self
            .iter()
            .filter(|m| !previous.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        let removed = previous
            .iter()
            .filter(|m| !self.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        (added, removed)
    }
}

impl<'a> IntoIterator for &'a MessageSet {
    type Item = &'a PersistentMessage;
    type IntoIter = std::slice::Iter<'a, PersistentMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<PersistentMessage> for MessageSet {
    fn from_iter<I: IntoIterator<Item = PersistentMessage>>(iter: I) -> Self {
        Self::from_messages(iter)
    }
}
