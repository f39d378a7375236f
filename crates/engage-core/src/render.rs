//! Message render model.
//!
//! Pure projection of a message into an abstract, display-agnostic element
//! tree. Holds no state: the tree is recomputed whenever the source message
//! changes. Messages that cannot be projected are skipped, never raised.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{ButtonAction, Message, MessageKind};

/// Payload key of the message background color.
const BACKGROUND_KEY: &str = "bg_color";
/// Prefix of message-wide button style keys, e.g. `button_bg_color`.
const BUTTON_STYLE_PREFIX: &str = "button_";

/// Prefix of the style keys for the button at `index`, e.g. `button1_` for
/// the first button.
fn button_style_prefix(index: usize) -> String {
    format!("button{}_", index + 1)
}

/// Partial button style; unset fields fall through to the next level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonStyle {
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub border_color: Option<String>,
    #[serde(default)]
    pub corner_radius: Option<u32>,
}

impl ButtonStyle {
    /// Read `{prefix}bg_color`, `{prefix}text_color`, `{prefix}border_color`
    /// and `{prefix}corner_radius` from a message payload. Values of the wrong
    /// type are ignored.
    fn from_payload(payload: &Value, prefix: &str) -> Self {
        let field = |name: &str| payload.get(format!("{prefix}{name}").as_str());
        let color = |name: &str| {
            field(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };
        Self {
            background_color: color("bg_color"),
            text_color: color("text_color"),
            border_color: color("border_color"),
            corner_radius: field("corner_radius")
                .and_then(Value::as_u64)
                .and_then(|r| u32::try_from(r).ok()),
        }
    }

    fn or(self, fallback: &Self) -> Self {
        Self {
            background_color: self
                .background_color
                .or_else(|| fallback.background_color.clone()),
            text_color: self.text_color.or_else(|| fallback.text_color.clone()),
            border_color: self.border_color.or_else(|| fallback.border_color.clone()),
            corner_radius: self.corner_radius.or(fallback.corner_radius),
        }
    }

    fn resolve(self, base: &ResolvedStyle) -> ResolvedStyle {
        ResolvedStyle {
            background_color: self
                .background_color
                .unwrap_or_else(|| base.background_color.clone()),
            text_color: self.text_color.unwrap_or_else(|| base.text_color.clone()),
            border_color: self
                .border_color
                .unwrap_or_else(|| base.border_color.clone()),
            corner_radius: self.corner_radius.unwrap_or(base.corner_radius),
        }
    }
}

/// Fully resolved button style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStyle {
    pub background_color: String,
    pub text_color: String,
    pub border_color: String,
    pub corner_radius: u32,
}

/// Style fallbacks below the message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDefaults {
    /// Message background when the payload sets none.
    pub background_color: String,
    /// Last resort for every field.
    pub base: ResolvedStyle,
    pub ephemeral: ButtonStyle,
    pub persistent: ButtonStyle,
}

impl RenderDefaults {
    const fn for_kind(&self, kind: MessageKind) -> &ButtonStyle {
        match kind {
            MessageKind::Ephemeral => &self.ephemeral,
            MessageKind::Persistent => &self.persistent,
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            base: ResolvedStyle {
                background_color: "#16a34a".to_string(),
                text_color: "#ffffff".to_string(),
                border_color: "#16a34a".to_string(),
                corner_radius: 4,
            },
            ephemeral: ButtonStyle {
                corner_radius: Some(8),
                ..ButtonStyle::default()
            },
            persistent: ButtonStyle {
                background_color: Some("#ffffff".to_string()),
                text_color: Some("#16a34a".to_string()),
                ..ButtonStyle::default()
            },
        }
    }
}

/// Media referenced by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderButton {
    pub id: String,
    pub title: String,
    pub style: ResolvedStyle,
    pub action: ButtonAction,
}

/// Display-agnostic projection of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderElementTree {
    pub message_id: String,
    pub kind: MessageKind,
    pub title: String,
    pub body: Option<String>,
    pub media: Option<MediaRef>,
    pub background_color: String,
    pub buttons: Vec<RenderButton>,
    /// Platform-rendered HTML carried alongside the elements.
    pub html: Option<String>,
}

/// Custom button action surfaced to the presentation layer unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAction {
    pub message_id: String,
    pub button_id: String,
    pub title: String,
    /// Action type as sent by the platform, e.g. `openUrl`.
    pub kind: String,
    pub data: Value,
}

/// Outcome of pressing a button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dispatch {
    /// Remove the message from the caller's working view.
    Dismiss { message_id: String },
    Custom(CustomAction),
}

impl RenderElementTree {
    /// Resolve the action of the button with `button_id`.
    #[must_use]
    pub fn dispatch(&self, button_id: &str) -> Option<Dispatch> {
        let button = self.buttons.iter().find(|b| b.id == button_id)?;
        Some(match &button.action {
            ButtonAction::Dismiss => Dispatch::Dismiss {
                message_id: self.message_id.clone(),
            },
            ButtonAction::Custom { kind, data } => Dispatch::Custom(CustomAction {
                message_id: self.message_id.clone(),
                button_id: button.id.clone(),
                title: button.title.clone(),
                kind: kind.clone(),
                data: data.clone(),
            }),
        })
    }
}

/// Why a message could not be projected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("message {message_id} has no elements")]
    MissingElements { message_id: String },
    #[error("message {message_id} has no title")]
    MissingTitle { message_id: String },
    #[error("message {message_id} button #{index} has a blank id or title")]
    InvalidButton { message_id: String, index: usize },
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).cloned()
}

/// Project a message, reporting why it is malformed.
///
/// # Errors
/// Returns `MalformedMessage` if elements, title, or a button id/title is
/// missing.
pub fn try_project<M: Message + ?Sized>(
    message: &M,
    defaults: &RenderDefaults,
) -> Result<RenderElementTree, MalformedMessage> {
    let message_id = message.id().to_string();
    let elements = message
        .elements()
        .ok_or_else(|| MalformedMessage::MissingElements {
            message_id: message_id.clone(),
        })?;
    let title = non_blank(elements.title.as_ref()).ok_or_else(|| MalformedMessage::MissingTitle {
        message_id: message_id.clone(),
    })?;

    let payload = message.payload();
    let message_style = ButtonStyle::from_payload(payload, BUTTON_STYLE_PREFIX);
    let variant_style = defaults.for_kind(message.kind());

    let buttons = elements
        .buttons
        .iter()
        .enumerate()
        .map(|(index, button)| {
            if button.id.trim().is_empty() || button.title.trim().is_empty() {
                return Err(MalformedMessage::InvalidButton {
                    message_id: message_id.clone(),
                    index,
                });
            }
            let style = ButtonStyle::from_payload(payload, &button_style_prefix(index))
                .or(&message_style)
            .or(variant_style)
            .resolve(&defaults.base);

            Ok(RenderButton {
                id: button.id.clone(),
                title: button.title.clone(),
                style,
                action: button.action.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RenderElementTree {
        message_id,
        kind: message.kind(),
        title,
        body: non_blank(elements.body.as_ref()),
        media: non_blank(elements.media_url.as_ref()).map(|url| MediaRef { url }),
        background_color: payload
            .get(BACKGROUND_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| defaults.background_color.clone(), str::to_string),
        buttons,
        html: message.html().map(str::to_string),
    })
}

/// Project a message with explicit style defaults; `None` if malformed.
#[must_use]
pub fn project_with<M: Message + ?Sized>(
    message: &M,
    defaults: &RenderDefaults,
) -> Option<RenderElementTree> {
    match try_project(message, defaults) {
        Ok(tree) => Some(tree),
        Err(e) => {
            tracing::debug!("Skipping message: {e}");
            None
        }
    }
}

/// Project a message with the default styles; `None` if malformed.
#[must_use]
pub fn project<M: Message + ?Sized>(message: &M) -> Option<RenderElementTree> {
    project_with(message, &RenderDefaults::default())
}
