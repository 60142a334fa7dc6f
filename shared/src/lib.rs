use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const X_BOUNDS: (f64, f64) = (-10.0, 10.0);
pub const Y_BOUNDS: (f64, f64) = (-2.0, 5.0);
pub const Z_BOUNDS: (f64, f64) = (-10.0, 10.0);

/// Where a participant stands until its first move.
pub const SPAWN_POSITION: Position = Position {
    x: 0.0,
    y: -2.0,
    z: 0.0,
};

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 15;
pub const MAX_CHAT_LEN: usize = 200;

/// Opaque per-connection identifier, unique while the connection is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Warrior,
    Mage,
}

impl Role {
    /// Exact, case-sensitive match against the wire names.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "warrior" => Some(Role::Warrior),
            "mage" => Some(Role::Mage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Pulls each axis independently to the nearest in-bounds value.
    pub fn clamped(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.clamp(X_BOUNDS.0, X_BOUNDS.1),
            y: y.clamp(Y_BOUNDS.0, Y_BOUNDS.1),
            z: z.clamp(Z_BOUNDS.0, Z_BOUNDS.1),
        }
    }

    pub fn in_bounds(&self) -> bool {
        (X_BOUNDS.0..=X_BOUNDS.1).contains(&self.x)
            && (Y_BOUNDS.0..=Y_BOUNDS.1).contains(&self.y)
            && (Z_BOUNDS.0..=Z_BOUNDS.1).contains(&self.z)
    }
}

impl Default for Position {
    fn default() -> Self {
        SPAWN_POSITION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ConnectionId,
    pub name: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub position: Position,
    pub rotation: f64,
}

impl Participant {
    pub fn new(id: ConnectionId, name: String, role: Role) -> Self {
        Self {
            id,
            name,
            role,
            position: SPAWN_POSITION,
            rotation: 0.0,
        }
    }
}

/// Frames sent from the server. Serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Welcome {
        id: ConnectionId,
    },
    ParticipantList(Vec<Participant>),
    Moved {
        id: ConnectionId,
        position: Position,
    },
    Rotated {
        id: ConnectionId,
        rotation: f64,
    },
    Chat {
        sender: String,
        message: String,
        timestamp: u64,
    },
    PrivilegedListing(Vec<Participant>),
    Evicted,
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::ParticipantList(_) => "participantList",
            ServerMessage::Moved { .. } => "moved",
            ServerMessage::Rotated { .. } => "rotated",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::PrivilegedListing(_) => "privilegedListing",
            ServerMessage::Evicted => "evicted",
        }
    }
}

/// Frames a well-behaved client sends. The server never trusts this shape and
/// parses inbound frames through [`Envelope`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Join {
        name: String,
        #[serde(rename = "type")]
        role: Role,
    },
    Move(Position),
    Rotate(f64),
    Chat {
        message: String,
    },
    ListAll,
    Evict {
        id: ConnectionId,
    },
}

/// Loosely typed inbound frame; the payload is validated separately.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}
