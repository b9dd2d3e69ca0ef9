//! Events emitted to renderers and commands accepted from shells.
//!
//! Shells (desktop, CLI) rebuild their entire render model from the
//! `ChatEvent` stream; they never touch the engine's stores directly.

use serde::{Deserialize, Serialize};

use crate::contacts::{Contact, ContactId};
use crate::timeline::Message;

/// The local user as reported by the backend at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uuid: String,
    pub display_name: String,
}

/// Normalized output stream consumed by renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Startup snapshots fully merged; live events flow from here on.
    Ready { identity: Identity },
    /// A contact was created (startup snapshot, unknown sender, or an
    /// accepted contact request). Emitted strictly before any message for
    /// that contact.
    ContactAdded(Contact),
    MessageAppended {
        contact_id: ContactId,
        message: Message,
    },
    SelectionChanged { contact_id: ContactId },
    /// The backend rejected a contact-connection request. No state changed.
    ContactRequestFailed,
    /// A command or transport failure surfaced to the user. State already
    /// reflects any optimistic local echo.
    Error(String),
}

/// Shell-originated commands serviced by the sync controller's run loop.
#[derive(Debug, Clone)]
pub enum Command {
    SetActive(ContactId),
    ClearActive,
    Send(String),
    RequestContact(String),
}
