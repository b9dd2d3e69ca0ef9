//! Active-conversation cursor: which single contact is selected.
//!
//! Locally composed sends are routed to the active conversation. There is
//! at most one; if set, it references an existing contact in the registry.

use crate::contacts::{ContactId, ContactRegistry, UnknownContact};

/// The currently-selected conversation, or none.
#[derive(Debug, Default)]
pub struct SessionCursor {
    active: Option<ContactId>,
}

impl SessionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `id` as the active conversation. Fails with `UnknownContact`
    /// when the registry has no such contact, leaving the previous
    /// selection in place; on success the replacement is atomic, so there
    /// is never a moment with two active contacts.
    pub fn set_active(
        &mut self,
        registry: &ContactRegistry,
        id: impl Into<ContactId>,
    ) -> Result<(), UnknownContact> {
        let id = id.into();
        if !registry.exists(&id) {
            return Err(UnknownContact(id));
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
