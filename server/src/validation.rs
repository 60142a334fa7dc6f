//! Inbound request validation.
//!
//! Every frame received from a client passes through [`parse_request`] before
//! it can reach the registry. The functions here are pure: they either turn a
//! raw payload into a typed [`Request`] or return a [`Rejection`] that the
//! caller logs and drops. Coordinates outside the world bounds are clamped
//! rather than rejected.

use crate::error::Rejection;
use serde_json::Value;
use shared::{ConnectionId, Envelope, Position, Role, MAX_CHAT_LEN, MAX_NAME_LEN, MIN_NAME_LEN};

const MAX_LOGGED_EVENT_LEN: usize = 32;

/// Display name that has been trimmed and length-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerName(String);

impl PlayerName {
    pub fn parse(raw: &str) -> Result<Self, Rejection> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
            return Err(Rejection::MalformedInput("name length out of range"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Chat line that is non-empty after trimming and within the length cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatText(String);

impl ChatText {
    pub fn parse(raw: &str) -> Result<Self, Rejection> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Rejection::MalformedInput("empty chat message"));
        }
        // Over-long messages are dropped, never truncated.
        if trimmed.chars().count() > MAX_CHAT_LEN {
            return Err(Rejection::MalformedInput("chat message too long"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join { name: PlayerName, role: Role },
    Move(Position),
    Rotate(f64),
    Chat(ChatText),
    ListAll,
    Evict { target: ConnectionId },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Join { .. } => "join",
            Request::Move(_) => "move",
            Request::Rotate(_) => "rotate",
            Request::Chat(_) => "chat",
            Request::ListAll => "listAll",
            Request::Evict { .. } => "evict",
        }
    }
}

/// Parses a text frame into a request, validating the payload for its event.
pub fn parse_request(text: &str) -> Result<Request, Rejection> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|_| Rejection::MalformedInput("frame is not an event envelope"))?;

    match envelope.event.as_str() {
        "join" => {
            let (name, role) = validate_join(&envelope.data)?;
            Ok(Request::Join { name, role })
        }
        "move" => validate_move(&envelope.data).map(Request::Move),
        "rotate" => validate_rotate(&envelope.data).map(Request::Rotate),
        "chat" => validate_chat(&envelope.data).map(Request::Chat),
        "listAll" => Ok(Request::ListAll),
        "evict" => validate_evict(&envelope.data).map(|target| Request::Evict { target }),
        other => Err(Rejection::UnknownEvent(
            other.chars().take(MAX_LOGGED_EVENT_LEN).collect(),
        )),
    }
}

pub fn validate_join(data: &Value) -> Result<(PlayerName, Role), Rejection> {
    let name = data
        .get("name")
        .and_then(Value::as_str)
        .ok_or(Rejection::MalformedInput("join requires a string name"))?;
    let role = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Rejection::MalformedInput("join requires a string type"))?;

    let name = PlayerName::parse(name)?;
    let role = Role::from_wire(role).ok_or(Rejection::MalformedInput("unknown role"))?;
    Ok((name, role))
}

/// All three axes must be present and numeric; each is clamped on its own.
pub fn validate_move(data: &Value) -> Result<Position, Rejection> {
    let x = coordinate(data, "x")?;
    let y = coordinate(data, "y")?;
    let z = coordinate(data, "z")?;
    Ok(Position::clamped(x, y, z))
}

pub fn validate_rotate(data: &Value) -> Result<f64, Rejection> {
    data.as_f64()
        .filter(|rotation| rotation.is_finite())
        .ok_or(Rejection::MalformedInput("rotation must be a number"))
}

pub fn validate_chat(data: &Value) -> Result<ChatText, Rejection> {
    let message = data
        .get("message")
        .and_then(Value::as_str)
        .ok_or(Rejection::MalformedInput("chat requires a string message"))?;
    ChatText::parse(message)
}

pub fn validate_evict(data: &Value) -> Result<ConnectionId, Rejection> {
    data.get("id")
        .and_then(Value::as_str)
        .map(ConnectionId::new)
        .ok_or(Rejection::MalformedInput("evict requires a string id"))
}

fn coordinate(data: &Value, axis: &'static str) -> Result<f64, Rejection> {
    data.get(axis)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .ok_or(Rejection::MalformedInput("move requires numeric x, y and z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    #[test]
    fn test_join_trims_name() {
        let (name, role) = validate_join(&json!({"name": "  alex  ", "type": "warrior"})).unwrap();
        assert_eq!(name.as_str(), "alex");
        assert_eq!(role, Role::Warrior);
    }

    #[test]
    fn test_join_name_length_bounds() {
        assert!(validate_join(&json!({"name": "abc", "type": "mage"})).is_ok());
        assert!(validate_join(&json!({"name": "a".repeat(15), "type": "mage"})).is_ok());
        assert!(validate_join(&json!({"name": "ab", "type": "mage"})).is_err());
        assert!(validate_join(&json!({"name": "a".repeat(16), "type": "mage"})).is_err());
        // Whitespace does not count towards the minimum
        assert!(validate_join(&json!({"name": "  ab   ", "type": "mage"})).is_err());
    }

    #[test]
    fn test_join_counts_characters_not_bytes() {
        let name = "ü".repeat(15);
        let (parsed, _) = validate_join(&json!({"name": name, "type": "mage"})).unwrap();
        assert_eq!(parsed.as_str().chars().count(), 15);
    }

    #[test]
    fn test_join_rejects_bad_shapes() {
        let cases = vec![
            json!(null),
            json!("alex"),
            json!({"name": "alex"}),
            json!({"type": "mage"}),
            json!({"name": 42, "type": "mage"}),
            json!({"name": "alex", "type": ["mage"]}),
            json!({"name": "alex", "type": "Mage"}),
            json!({"name": "alex", "type": "rogue"}),
        ];

        for data in cases {
            assert!(validate_join(&data).is_err(), "should reject {}", data);
        }
    }

    #[test]
    fn test_move_clamps_each_axis() {
        let position = validate_move(&json!({"x": 999, "y": -100.5, "z": 3.25})).unwrap();
        assert_approx_eq!(position.x, 10.0);
        assert_approx_eq!(position.y, -2.0);
        assert_approx_eq!(position.z, 3.25);
    }

    #[test]
    fn test_move_requires_all_axes() {
        assert!(validate_move(&json!({"x": 1, "y": 2})).is_err());
        assert!(validate_move(&json!({"x": 1, "y": "2", "z": 3})).is_err());
        assert!(validate_move(&json!({"x": 1, "y": true, "z": 3})).is_err());
        assert!(validate_move(&json!([1, 2, 3])).is_err());
        assert!(validate_move(&json!(null)).is_err());
    }

    #[test]
    fn test_rotate_accepts_any_number() {
        assert_approx_eq!(validate_rotate(&json!(1234.5)).unwrap(), 1234.5);
        assert_approx_eq!(validate_rotate(&json!(-7)).unwrap(), -7.0);
        assert!(validate_rotate(&json!("1.0")).is_err());
        assert!(validate_rotate(&json!({"rotation": 1.0})).is_err());
        assert!(validate_rotate(&json!(null)).is_err());
    }

    #[test]
    fn test_chat_trims_and_caps() {
        let text = validate_chat(&json!({"message": "  hello  "})).unwrap();
        assert_eq!(text.as_str(), "hello");

        let at_cap = "x".repeat(MAX_CHAT_LEN);
        assert!(validate_chat(&json!({"message": at_cap})).is_ok());

        let over_cap = "x".repeat(MAX_CHAT_LEN + 1);
        assert_eq!(
            validate_chat(&json!({"message": over_cap})),
            Err(Rejection::MalformedInput("chat message too long"))
        );

        assert!(validate_chat(&json!({"message": "   "})).is_err());
        assert!(validate_chat(&json!({"message": 5})).is_err());
        assert!(validate_chat(&json!("hello")).is_err());
    }

    #[test]
    fn test_evict_requires_string_id() {
        assert_eq!(
            validate_evict(&json!({"id": "abc"})).unwrap(),
            ConnectionId::new("abc")
        );
        assert!(validate_evict(&json!({"id": 5})).is_err());
        assert!(validate_evict(&json!({})).is_err());
    }

    #[test]
    fn test_parse_request_dispatches_by_event() {
        let request = parse_request(r#"{"event":"move","data":{"x":1,"y":2,"z":3}}"#).unwrap();
        assert_eq!(request, Request::Move(Position::clamped(1.0, 2.0, 3.0)));

        let request = parse_request(r#"{"event":"rotate","data":0.5}"#).unwrap();
        assert_eq!(request, Request::Rotate(0.5));

        let request = parse_request(r#"{"event":"listAll"}"#).unwrap();
        assert_eq!(request, Request::ListAll);
        assert_eq!(request.name(), "listAll");
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        assert!(matches!(
            parse_request("not json"),
            Err(Rejection::MalformedInput(_))
        ));
        assert!(matches!(
            parse_request(r#"{"data":{}}"#),
            Err(Rejection::MalformedInput(_))
        ));
        assert_eq!(
            parse_request(r#"{"event":"teleport","data":{}}"#),
            Err(Rejection::UnknownEvent("teleport".into()))
        );
    }

    #[test]
    fn test_unknown_event_name_is_truncated() {
        let long_event = "e".repeat(500);
        let frame = json!({"event": long_event}).to_string();
        match parse_request(&frame) {
            Err(Rejection::UnknownEvent(name)) => assert_eq!(name.len(), MAX_LOGGED_EVENT_LEN),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
