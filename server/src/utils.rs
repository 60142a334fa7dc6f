use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::ConnectionId;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CONNECTION_ID_LEN: usize = 20;

// Get current wall-clock timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

// Random alphanumeric token; uniqueness among open connections is checked by the caller
pub fn generate_connection_id() -> ConnectionId {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONNECTION_ID_LEN)
        .map(char::from)
        .collect();
    ConnectionId::new(token)
}
