//! Session lifecycle and message channels for the engagement client.
//!
//! Provides:
//! - `SessionManager` - Token exchange, session open and identity binding
//! - `OutboundChannel` - User attribute patches and events
//! - `MessageChannel` - Pull-once (ephemeral) and sync-and-cache (persistent)
//!   retrieval
//! - `MemoryTransport` - Scripted in-memory platform (feature: memory)

pub mod channel;
pub mod error;
pub mod manager;
pub mod outbound;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use channel::{ChannelKind, Ephemeral, MessageChannel, Persistent};
pub use error::{ErrorInfo, InitStage, SessionError};
pub use manager::{Session, SessionManager, SessionStatus};
pub use outbound::OutboundChannel;

#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryTransport;
