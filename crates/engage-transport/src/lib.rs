//! Wire protocol and HTTP transport for the engagement platform.
//!
//! Provides:
//! - Wire protocol (JSON request/response bodies and endpoint paths)
//! - HTTP transport (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};
pub use protocol::ApiResponse;
