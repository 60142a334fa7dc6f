//! Request handling for the whole session.
//!
//! [`Session`] wires the request pipeline together: a raw frame is validated,
//! applied to the registry (or handed to the moderation authority), and the
//! outcome is fanned out through the dispatcher. It is owned by the server's
//! event loop, so every call runs to completion before the next one starts.

use crate::config::ServerConfig;
use crate::dispatcher::{ConnectionHandle, Dispatcher};
use crate::error::Rejection;
use crate::moderation::ModerationAuthority;
use crate::registry::SessionRegistry;
use crate::validation::{parse_request, Request};
use log::debug;
use shared::{ConnectionId, ServerMessage};

pub struct Session {
    registry: SessionRegistry,
    dispatcher: Dispatcher,
    moderation: ModerationAuthority,
}

impl Session {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            dispatcher: Dispatcher::new(config.max_connections),
            moderation: ModerationAuthority::new(config.moderator_name.clone()),
        }
    }

    /// Accepts a new connection and greets it with its identifier
    ///
    /// Returns None when the server is full.
    pub fn connect(&mut self, handle: ConnectionHandle) -> Option<ConnectionId> {
        let id = self.dispatcher.register(handle)?;
        self.dispatcher
            .send_to(&id, &ServerMessage::Welcome { id: id.clone() });
        self.reap_dropped();
        Some(id)
    }

    /// Cleans up after a connection that has gone away for any reason
    pub fn disconnect(&mut self, id: &ConnectionId) {
        self.dispatcher.unregister(id);
        if self.registry.leave(id).is_some() {
            self.broadcast_participants();
        }
        self.reap_dropped();
    }

    /// Validates and applies one inbound text frame
    ///
    /// Invalid or unauthorized requests are dropped without a response.
    pub fn handle_frame(&mut self, id: &ConnectionId, text: &str) {
        if !self.dispatcher.is_active(id) {
            debug!("Ignoring frame from inactive connection {}", id);
            return;
        }

        let request = match parse_request(text) {
            Ok(request) => request,
            Err(rejection) => {
                debug!("Dropped frame from {}: {}", id, rejection);
                return;
            }
        };

        let event = request.name();
        if let Err(rejection) = self.handle_request(id, request) {
            debug!("Dropped {} from {}: {}", event, id, rejection);
        }
        self.reap_dropped();
    }

    pub fn handle_request(&mut self, id: &ConnectionId, request: Request) -> Result<(), Rejection> {
        match request {
            Request::Join { name, role } => {
                let participants = self.registry.join(id, name, role)?;
                self.dispatcher
                    .broadcast_all(&ServerMessage::ParticipantList(participants));
            }
            Request::Move(position) => {
                let position = self
                    .registry
                    .move_to(id, position)
                    .ok_or_else(|| Rejection::NotJoined(id.clone()))?;
                self.dispatcher.broadcast_all(&ServerMessage::Moved {
                    id: id.clone(),
                    position,
                });
            }
            Request::Rotate(rotation) => {
                let rotation = self
                    .registry
                    .rotate(id, rotation)
                    .ok_or_else(|| Rejection::NotJoined(id.clone()))?;
                self.dispatcher.broadcast_all(&ServerMessage::Rotated {
                    id: id.clone(),
                    rotation,
                });
            }
            Request::Chat(message) => {
                let line = self
                    .registry
                    .chat(id, message)
                    .ok_or_else(|| Rejection::NotJoined(id.clone()))?;
                self.dispatcher.broadcast_all(&ServerMessage::Chat {
                    sender: line.sender,
                    message: line.message,
                    timestamp: line.timestamp,
                });
            }
            Request::ListAll => {
                self.moderation
                    .list_all(id, &self.registry, &mut self.dispatcher)?;
            }
            Request::Evict { target } => {
                self.moderation
                    .evict(id, &target, &mut self.registry, &mut self.dispatcher)?;
            }
        }
        Ok(())
    }

    /// Removes participants whose connections the dispatcher dropped as too slow
    ///
    /// Each round of removals is announced with one participant list, which
    /// may itself overflow further queues, so this repeats until nothing new
    /// is dropped.
    fn reap_dropped(&mut self) {
        loop {
            let dropped = self.dispatcher.take_dropped();
            if dropped.is_empty() {
                return;
            }

            let mut removed = false;
            for id in &dropped {
                removed |= self.registry.leave(id).is_some();
            }
            if removed {
                self.broadcast_participants();
            }
        }
    }

    fn broadcast_participants(&mut self) {
        self.dispatcher
            .broadcast_all(&ServerMessage::ParticipantList(self.registry.snapshot()));
    }

    /// Returns the number of open connections
    pub fn connection_count(&self) -> usize {
        self.dispatcher.len()
    }

    /// Returns the number of joined participants
    pub fn participant_count(&self) -> usize {
        self.registry.len()
    }
}
