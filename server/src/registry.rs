//! Authoritative participant state for the session
//!
//! This module owns every joined participant and is the only place that
//! creates, mutates, or removes one:
//! - Join handshake that promotes a connection into a participant
//! - Position, rotation and chat updates from the owning connection
//! - Removal on disconnect or eviction
//! - Ordered snapshots for participant list broadcasts
//!
//! The registry itself is not synchronized. The server owns exactly one
//! instance inside its event loop, which applies operations one at a time in
//! arrival order.

use crate::error::Rejection;
use crate::utils::get_timestamp;
use crate::validation::{ChatText, PlayerName};
use log::info;
use shared::{ConnectionId, Participant, Position, Role};
use std::collections::HashMap;

/// A participant together with its join order
#[derive(Debug)]
struct Slot {
    order: u64,
    participant: Participant,
}

/// Chat line stamped by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub sender: String,
    pub message: String,
    pub timestamp: u64,
}

/// Tracks all joined participants keyed by connection id
///
/// Connections that have not completed the join handshake have no entry, so
/// every mutating operation on them is a no-op.
pub struct SessionRegistry {
    /// Joined participants indexed by their connection id
    participants: HashMap<ConnectionId, Slot>,
    /// Next join order value, used to keep snapshots stable
    next_order: u64,
    /// Last timestamp handed out to a chat line
    last_chat_timestamp: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            participants: HashMap::new(),
            next_order: 0,
            last_chat_timestamp: 0,
        }
    }

    /// Promotes a connection into a participant
    ///
    /// Fails if the connection has already joined; name and role cannot be
    /// changed afterwards. On success returns the full participant set so the
    /// caller can broadcast it.
    pub fn join(
        &mut self,
        id: &ConnectionId,
        name: PlayerName,
        role: Role,
    ) -> Result<Vec<Participant>, Rejection> {
        if self.participants.contains_key(id) {
            return Err(Rejection::AlreadyJoined(id.clone()));
        }

        let participant = Participant::new(id.clone(), name.into_inner(), role);
        info!(
            "Participant {} joined as '{}' ({:?})",
            id, participant.name, participant.role
        );

        let order = self.next_order;
        self.next_order += 1;
        self.participants
            .insert(id.clone(), Slot { order, participant });

        Ok(self.snapshot())
    }

    /// Stores a new position and returns the value actually stored
    pub fn move_to(&mut self, id: &ConnectionId, position: Position) -> Option<Position> {
        let slot = self.participants.get_mut(id)?;
        // Re-clamping is a no-op for validated input and keeps the bounds invariant local.
        let stored = Position::clamped(position.x, position.y, position.z);
        slot.participant.position = stored;
        Some(stored)
    }

    pub fn rotate(&mut self, id: &ConnectionId, rotation: f64) -> Option<f64> {
        let slot = self.participants.get_mut(id)?;
        slot.participant.rotation = rotation;
        Some(rotation)
    }

    /// Stamps a chat line with the sender's name and a server timestamp
    ///
    /// Timestamps never go backwards even if the wall clock does.
    pub fn chat(&mut self, id: &ConnectionId, message: ChatText) -> Option<ChatLine> {
        let sender = self.participants.get(id)?.participant.name.clone();

        let timestamp = get_timestamp().max(self.last_chat_timestamp);
        self.last_chat_timestamp = timestamp;

        Some(ChatLine {
            sender,
            message: message.into_inner(),
            timestamp,
        })
    }

    /// Removes a participant, returning it if it was present
    pub fn leave(&mut self, id: &ConnectionId) -> Option<Participant> {
        let slot = self.participants.remove(id)?;
        info!("Participant {} ('{}') left", id, slot.participant.name);
        Some(slot.participant)
    }

    /// All participants in join order
    pub fn snapshot(&self) -> Vec<Participant> {
        let mut slots: Vec<&Slot> = self.participants.values().collect();
        slots.sort_by_key(|slot| slot.order);
        slots
            .into_iter()
            .map(|slot| slot.participant.clone())
            .collect()
    }

    /// Display name of a joined participant
    pub fn name_of(&self, id: &ConnectionId) -> Option<&str> {
        self.participants
            .get(id)
            .map(|slot| slot.participant.name.as_str())
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.participants.contains_key(id)
    }

    /// Returns the number of joined participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns true if nobody has joined
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
