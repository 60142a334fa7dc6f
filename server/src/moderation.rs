//! Privileged moderator operations.
//!
//! A single reserved display name carries moderation rights. The check is an
//! exact, case-sensitive comparison against the name the actor joined with.
//! Refusals are silent: the caller only logs them.

use crate::dispatcher::Dispatcher;
use crate::error::Rejection;
use crate::registry::SessionRegistry;
use log::info;
use shared::{ConnectionId, Participant, ServerMessage};

pub struct ModerationAuthority {
    privileged_name: String,
}

impl ModerationAuthority {
    pub fn new(privileged_name: impl Into<String>) -> Self {
        Self {
            privileged_name: privileged_name.into(),
        }
    }

    pub fn is_privileged(&self, registry: &SessionRegistry, actor: &ConnectionId) -> bool {
        registry.name_of(actor) == Some(self.privileged_name.as_str())
    }

    fn authorize(&self, registry: &SessionRegistry, actor: &ConnectionId) -> Result<(), Rejection> {
        if !registry.contains(actor) {
            return Err(Rejection::NotJoined(actor.clone()));
        }
        if !self.is_privileged(registry, actor) {
            return Err(Rejection::Unauthorized(actor.clone()));
        }
        Ok(())
    }

    /// Sends the full participant listing to the acting connection only
    pub fn list_all(
        &self,
        actor: &ConnectionId,
        registry: &SessionRegistry,
        dispatcher: &mut Dispatcher,
    ) -> Result<usize, Rejection> {
        self.authorize(registry, actor)?;

        let participants = registry.snapshot();
        let count = participants.len();
        dispatcher.send_to(actor, &ServerMessage::PrivilegedListing(participants));
        Ok(count)
    }

    /// Removes a participant on the moderator's behalf
    ///
    /// The target is notified through its own outbound queue before its
    /// registry entry goes away, then its transport is closed behind the
    /// notice and everyone receives the updated participant list.
    pub fn evict(
        &self,
        actor: &ConnectionId,
        target: &ConnectionId,
        registry: &mut SessionRegistry,
        dispatcher: &mut Dispatcher,
    ) -> Result<Participant, Rejection> {
        self.authorize(registry, actor)?;
        if !registry.contains(target) {
            return Err(Rejection::UnknownTarget(target.clone()));
        }

        dispatcher.send_to(target, &ServerMessage::Evicted);
        dispatcher.close(target);

        let removed = registry
            .leave(target)
            .ok_or_else(|| Rejection::UnknownTarget(target.clone()))?;
        info!("Moderator {} evicted {} ('{}')", actor, target, removed.name);

        dispatcher.broadcast_all(&ServerMessage::ParticipantList(registry.snapshot()));
        Ok(removed)
    }
}
