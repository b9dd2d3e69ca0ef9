//! Contact registry: the authoritative map of known conversation partners.
//!
//! Source of truth for "does this contact exist locally". Contacts are
//! created on first sighting (startup snapshot, incoming message from an
//! unknown sender, or an accepted contact request) and never deleted
//! in-process. A repeat sighting keeps the first display name even if the
//! backend later reports a different one for the same id.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Opaque stable contact identity (the backend's uuid for the contact).
pub type ContactId = String;

/// A known conversation partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub display_name: String,
}

/// A lookup or selection referenced a contact the registry has never seen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown contact: {0}")]
pub struct UnknownContact(pub ContactId);

/// In-memory contact store (create, lookup). Owned by the sync controller,
/// which is the only writer; readers get clones.
#[derive(Debug, Default)]
pub struct ContactRegistry {
    contacts: HashMap<ContactId, Contact>,
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the contact if absent and return it with `created = true`;
    /// return the existing record unchanged with `created = false`
    /// otherwise (first name wins). Creation never fails.
    pub fn upsert(
        &mut self,
        id: impl Into<ContactId>,
        display_name: impl Into<String>,
    ) -> (&Contact, bool) {
        match self.contacts.entry(id.into()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let contact = Contact {
                    id: entry.key().clone(),
                    display_name: display_name.into(),
                };
                (entry.insert(contact), true)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.contacts.contains_key(id)
    }

    /// Snapshot of all contacts for rendering (unordered).
    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_once() {
        let mut registry = ContactRegistry::new();
        let (contact, created) = registry.upsert("u1", "Alice");
        assert!(created);
        assert_eq!(contact.display_name, "Alice");

        let (contact, created) = registry.upsert("u1", "Alice");
        assert!(!created);
        assert_eq!(contact.id, "u1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeat_sighting_keeps_first_name() {
        let mut registry = ContactRegistry::new();
        registry.upsert("u1", "Alice");
        let (contact, created) = registry.upsert("u1", "Alicia");
        assert!(!created);
        assert_eq!(contact.display_name, "Alice");
    }

    #[test]
    fn lookup_misses_are_not_found() {
        let registry = ContactRegistry::new();
        assert!(registry.get("nobody").is_none());
        assert!(!registry.exists("nobody"));
        assert!(registry.is_empty());
    }
}
