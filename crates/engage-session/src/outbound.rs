//! Outbound channel for user attribute patches and events.

use std::sync::Arc;

use engage_core::{Event, UserAttributes};

use crate::{SessionError, SessionManager};

/// Sends user-state updates and events upstream.
///
/// Each call is one delivery attempt. Updates and events are independent:
/// no ordering is kept between them.
pub struct OutboundChannel {
    session: Arc<SessionManager>,
}

impl OutboundChannel {
    #[must_use]
    pub const fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Send an additive attribute patch.
    ///
    /// An empty patch succeeds without a network call.
    ///
    /// # Errors
    /// Returns `NotReady` before the session is ready, or `Delivery` if the
    /// transport fails.
    pub async fn update_user(&self, patch: &UserAttributes) -> Result<(), SessionError> {
        let handle = self.session.ready_handle()?;
        if patch.is_empty() {
            tracing::debug!("Skipping empty user patch");
            return Ok(());
        }

        self.session
            .transport()
            .send_user_patch(&handle, patch)
            .await
            .map_err(|e| {
                tracing::warn!(fields = patch.len(), "User update failed: {e}");
                SessionError::Delivery(e)
            })?;

        tracing::debug!(fields = patch.len(), "User updated");
        Ok(())
    }

    /// Track an event.
    ///
    /// # Errors
    /// Returns `NotReady` before the session is ready, `InvalidInput` for an
    /// unnamed event, or `Delivery` if the transport fails.
    pub async fn track(&self, event: &Event) -> Result<(), SessionError> {
        let handle = self.session.ready_handle()?;
        if event.name().trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "event name must not be empty".to_string(),
            ));
        }

        self.session
            .transport()
            .send_event(&handle, event)
            .await
            .map_err(|e| {
                tracing::warn!(event = event.name(), event_id = %event.id(), "Event delivery failed: {e}");
                SessionError::Delivery(e)
            })?;

        tracing::debug!(event = event.name(), event_id = %event.id(), "Event tracked");
        Ok(())
    }
}
