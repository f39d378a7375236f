//! Core abstractions for the engagement messaging client.
//!
//! This crate provides the fundamental building blocks:
//! - `Identity` / `Token` - Who the session is for and how it authenticates
//! - `UserAttributes` / `Event` - Outbound user-state patches and events
//! - Message types and `MessageSet` - Validated inbound content
//! - `MessageSetStore` - Cached set + change notification
//! - `render` - Pure projection of messages into display elements
//! - `TokenProvider` and `Transport` traits

pub mod config;
pub mod identity;
pub mod message;
pub mod profile;
pub mod render;
pub mod set_store;
pub mod traits;
pub mod view;

pub use config::{ConfigError, SessionConfig};
pub use identity::{EmptyIdentity, Identity, Token, TokenClaims, TokenError};
pub use message::{
    Button, ButtonAction, ChannelKey, DisplayPolicy, EphemeralMessage, FetchQuery, Message,
    MessageElements, MessageKind, MessageSet, PersistentMessage, RenderablePayload, WireMessage,
    WireMessageError,
};
pub use profile::{AttributeValue, Event, UserAttributes};
pub use render::{
    CustomAction, Dispatch, MalformedMessage, RenderDefaults, RenderElementTree, project,
    project_with, try_project,
};
pub use set_store::{MessageSetStore, SetChanged};
pub use traits::{SessionHandle, TokenProvider, Transport, TransportError, token_provider_fn};
pub use view::WorkingView;
