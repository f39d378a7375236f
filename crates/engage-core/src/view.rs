//! Caller-owned working view over a message set.

use crate::{
    MessageSet, PersistentMessage,
    render::{CustomAction, Dispatch},
};

/// The messages a caller is currently displaying.
///
/// Built from a [`MessageSet`] snapshot. Dismissal only touches this view;
/// the channel's cached set is left as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingView {
    messages: Vec<PersistentMessage>,
}

impl WorkingView {
    #[must_use]
    pub fn from_set(set: &MessageSet) -> Self {
        Self {
            messages: set.as_slice().to_vec(),
        }
    }

    /// Rebuild from a fresh set. Earlier dismissals are not carried over.
    pub fn refresh(&mut self, set: &MessageSet) {
        self.messages = set.as_slice().to_vec();
    }

    #[must_use]
    pub fn messages(&self) -> &[PersistentMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Remove a message from this view. Returns `false` if it was not shown.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        before != self.messages.len()
    }

    /// Apply a button dispatch.
    ///
    /// Dismissals are handled here; custom actions are handed back untouched.
    pub fn apply(&mut self, dispatch: Dispatch) -> Option<CustomAction> {
        match dispatch {
            Dispatch::Dismiss { message_id } => {
                self.dismiss(&message_id);
                None
            }
            Dispatch::Custom(action) => Some(action),
        }
    }
}

impl From<&MessageSet> for WorkingView {
    fn from(set: &MessageSet) -> Self {
        Self::from_set(set)
    }
}
