//! Chat state synchronization engine.
//!
//! Merges the startup contact-overview and chat-history snapshots into
//! per-contact timelines, applies live push events through the same merge
//! path ("this contact may or may not already exist" has one code path),
//! tracks the active conversation, and emits a normalized event stream for
//! renderers. All state is owned here and mutated on a single task; see
//! `run` for the event loop the shells drive.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bridge::{Bridge, BridgeError, PushEvent};
use crate::contacts::{Contact, ContactId, ContactRegistry, UnknownContact};
use crate::events::{ChatEvent, Command, Identity};
use crate::protocol::{AddContactResponse, HistoryEntry, IncomingMessage, OverviewEntry};
use crate::session::SessionCursor;
use crate::timeline::{Message, SentBy, TimelineStore};

/// Engine lifecycle: snapshots are merged in `Loading`; live events are
/// accepted only once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
}

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    UnknownContact(#[from] UnknownContact),
    #[error("no active conversation selected")]
    NoActiveSession,
    #[error("malformed {0} snapshot: {1}")]
    MalformedSnapshot(&'static str, serde_json::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Owns the registry, timelines, and cursor; the only writer to all three.
pub struct SyncController<B: Bridge> {
    bridge: B,
    registry: ContactRegistry,
    timelines: TimelineStore,
    cursor: SessionCursor,
    state: SyncState,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl<B: Bridge> SyncController<B> {
    pub fn new(bridge: B, events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self {
            bridge,
            registry: ContactRegistry::new(),
            timelines: TimelineStore::new(),
            cursor: SessionCursor::new(),
            state: SyncState::Uninitialized,
            events,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Read-only contact snapshot (unordered).
    pub fn contacts(&self) -> Vec<Contact> {
        self.registry.contacts()
    }

    /// Read-only copy of one conversation, in timestamp order.
    pub fn transcript(&self, contact_id: &str) -> Vec<Message> {
        self.timelines.snapshot(contact_id)
    }

    pub fn active(&self) -> Option<&str> {
        self.cursor.active()
    }

    fn emit(&self, event: ChatEvent) {
        // A dropped receiver means the shell exited; nothing left to render to.
        let _ = self.events.send(event);
    }

    /// The single merge path for contact creation: create the contact and
    /// its timeline partition on first sighting and emit `ContactAdded`
    /// before anything that references it. A repeat sighting is a no-op.
    fn merge_contact(&mut self, id: &str, display_name: &str) {
        let (contact, created) = self.registry.upsert(id, display_name);
        if created {
            let contact = contact.clone();
            self.timelines.create_partition(id);
            self.emit(ChatEvent::ContactAdded(contact));
        }
    }

    /// Load identity and both startup snapshots, merge contacts before
    /// history, and transition to `Ready`. A snapshot that fails strict
    /// parsing is skipped (the other still applies); the failure is logged
    /// and surfaced on the event stream.
    pub async fn initialize(&mut self) -> Result<Identity, SyncError> {
        self.state = SyncState::Loading;

        let uuid = self.bridge.get_identity().await?;
        let display_name = self.bridge.get_display_name().await?;
        let overview = self.bridge.load_contact_overview().await?;
        let history = self.bridge.load_chat_history().await?;

        if let Err(e) = self.apply_overview(overview) {
            log::error!("{}", e);
            self.emit(ChatEvent::Error(e.to_string()));
        }
        if let Err(e) = self.apply_history(history) {
            log::error!("{}", e);
            self.emit(ChatEvent::Error(e.to_string()));
        }

        self.state = SyncState::Ready;
        Ok(Identity { uuid, display_name })
    }

    fn apply_overview(&mut self, payload: Value) -> Result<(), SyncError> {
        let entries: Vec<OverviewEntry> = parse_payload(payload)
            .map_err(|e| SyncError::MalformedSnapshot("contact overview", e))?;
        for entry in &entries {
            self.merge_contact(&entry.uuid, &entry.name);
        }
        Ok(())
    }

    fn apply_history(&mut self, payload: Value) -> Result<(), SyncError> {
        let entries: Vec<HistoryEntry> =
            parse_payload(payload).map_err(|e| SyncError::MalformedSnapshot("chat history", e))?;

        // Contacts are merged before history: a message may reference a
        // contact the overview never listed; its id stands in for the
        // display name. First name wins, so it keeps the id even if the
        // backend names it later.
        let mut affected: Vec<ContactId> = Vec::new();
        for entry in &entries {
            if !self.registry.exists(&entry.contact) {
                self.merge_contact(&entry.contact, &entry.contact);
            }
            if !affected.contains(&entry.contact) {
                affected.push(entry.contact.clone());
            }
        }

        let messages: Vec<Message> = entries
            .into_iter()
            .map(|entry| Message {
                contact_id: entry.contact,
                sent_by: entry.sent_by,
                body: entry.message,
                timestamp: entry.date,
            })
            .collect();
        self.timelines.append_bulk(messages)?;

        // Partitions were all empty before the bulk merge, so re-reading
        // them yields exactly the merged history in timestamp order.
        for contact_id in affected {
            for message in self.timelines.snapshot(&contact_id) {
                self.emit(ChatEvent::MessageAppended {
                    contact_id: contact_id.clone(),
                    message,
                });
            }
        }
        Ok(())
    }

    /// Apply one live push event. Malformed payloads are logged and
    /// dropped with state unchanged; events outside `Ready` are ignored.
    pub fn handle_push(&mut self, event: PushEvent) {
        if self.state != SyncState::Ready {
            log::warn!("dropping push event received before Ready");
            return;
        }
        match event {
            PushEvent::IncomingMessage(payload) => match parse_payload(payload) {
                Ok(incoming) => self.apply_incoming(incoming),
                Err(e) => log::warn!("dropping malformed incomingMessage event: {}", e),
            },
            PushEvent::AddContactResponse(payload) => match parse_payload(payload) {
                Ok(response) => self.apply_contact_response(response),
                Err(e) => log::warn!("dropping malformed addContactResponse event: {}", e),
            },
        }
    }

    fn apply_incoming(&mut self, incoming: IncomingMessage) {
        // Same merge path as startup: an unknown sender is created first so
        // the renderer sees ContactAdded before the message lands.
        self.merge_contact(&incoming.sender_uuid, &incoming.sender_name);
        let message = Message {
            contact_id: incoming.sender_uuid.clone(),
            sent_by: SentBy::Peer,
            body: incoming.message,
            timestamp: chrono::Utc::now().timestamp(),
        };
        match self.timelines.append_one(message.clone()) {
            Ok(()) => self.emit(ChatEvent::MessageAppended {
                contact_id: incoming.sender_uuid,
                message,
            }),
            Err(e) => log::error!("incoming message lost: {}", e),
        }
    }

    fn apply_contact_response(&mut self, response: AddContactResponse) {
        if !response.contact_exists {
            self.emit(ChatEvent::ContactRequestFailed);
            return;
        }
        let (Some(uuid), Some(name)) = (response.contact_uuid, response.contact_name) else {
            log::warn!("addContactResponse confirmed a contact but named none; dropping");
            return;
        };
        self.merge_contact(&uuid, &name);
    }

    /// Select the active conversation, emitting `SelectionChanged` on
    /// success. An unknown id fails and leaves the previous selection.
    pub fn set_active(&mut self, contact_id: impl Into<ContactId>) -> Result<(), SyncError> {
        let contact_id = contact_id.into();
        self.cursor.set_active(&self.registry, contact_id.clone())?;
        self.emit(ChatEvent::SelectionChanged { contact_id });
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.cursor.clear();
    }

    /// Optimistically echo `body` into the active conversation and forward
    /// it to the backend. The echo is not rolled back if the forward
    /// fails; the failure is surfaced and the echoed message stays.
    pub async fn send_message(&mut self, body: impl Into<String>) -> Result<(), SyncError> {
        let contact_id = self
            .cursor
            .active()
            .ok_or(SyncError::NoActiveSession)?
            .to_string();
        let message = Message {
            contact_id: contact_id.clone(),
            sent_by: SentBy::Me,
            body: body.into(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.timelines.append_one(message.clone())?;
        self.emit(ChatEvent::MessageAppended {
            contact_id: contact_id.clone(),
            message: message.clone(),
        });
        self.bridge.send_message(&contact_id, &message.body).await?;
        Ok(())
    }

    /// Ask the backend to connect with `uuid`. Fire-and-forget; the
    /// outcome arrives later as an `addContactResponse` push event.
    pub async fn request_contact(&self, uuid: &str) -> Result<(), SyncError> {
        self.bridge.request_contact_connection(uuid).await?;
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        let outcome = match command {
            Command::SetActive(contact_id) => self.set_active(contact_id),
            Command::ClearActive => {
                self.clear_active();
                Ok(())
            }
            Command::Send(body) => self.send_message(body).await,
            Command::RequestContact(uuid) => self.request_contact(&uuid).await,
        };
        if let Err(e) = outcome {
            log::warn!("command failed: {}", e);
            self.emit(ChatEvent::Error(e.to_string()));
        }
    }

    /// Single-task engine loop: initialize, announce `Ready`, then service
    /// push events and shell commands one item at a time. Each is fully
    /// applied (registry, then timeline, then emitted event) before the
    /// next is taken up.
    pub async fn run(
        mut self,
        mut push_rx: mpsc::Receiver<PushEvent>,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), SyncError> {
        let identity = self.initialize().await?;
        self.emit(ChatEvent::Ready { identity });
        loop {
            tokio::select! {
                event = push_rx.recv() => match event {
                    Some(event) => self.handle_push(event),
                    None => {
                        log::info!("bridge push channel closed; engine stopping");
                        return Ok(());
                    }
                },
                command = cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        log::info!("shell command channel closed; engine stopping");
                        return Ok(());
                    }
                },
            }
        }
    }
}

/// Snapshot and push payloads arrive either as JSON values or as JSON text
/// wrapped in a string (the backend serializes with its own encoder);
/// accept both, strictly.
fn parse_payload<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    }
}
