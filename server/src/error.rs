use shared::ConnectionId;

/// Why an inbound request was dropped.
///
/// Rejections are logged but never reported back to the sender.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("connection {0} has not joined")]
    NotJoined(ConnectionId),
    #[error("connection {0} has already joined")]
    AlreadyJoined(ConnectionId),
    #[error("connection {0} is not allowed to moderate")]
    Unauthorized(ConnectionId),
    #[error("no participant with id {0}")]
    UnknownTarget(ConnectionId),
}
