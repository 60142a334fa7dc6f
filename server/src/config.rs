use std::time::Duration;

pub const DEFAULT_MODERATOR_NAME: &str = "swami";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to
    pub bind_addr: String,
    /// Maximum number of open connections, joined or not
    pub max_connections: usize,
    /// Frames buffered per connection before it counts as a slow receiver
    pub outbound_buffer: usize,
    /// Display name that carries moderation rights
    pub moderator_name: String,
    /// How often to log a status line
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:10000".to_string(),
            max_connections: 64,
            outbound_buffer: 256,
            moderator_name: DEFAULT_MODERATOR_NAME.to_string(),
            stats_interval: Duration::from_secs(60),
        }
    }
}
