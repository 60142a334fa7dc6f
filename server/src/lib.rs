//! # Arena Session Server Library
//!
//! This library provides the authoritative server for a small shared 3D arena.
//! Clients connect over WebSocket, join with a display name and a role, and
//! then stream position, rotation and chat updates. The server validates every
//! request, applies it to the single copy of the session state and fans the
//! result out to all open connections.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! Each connection runs its own reader and writer tasks, but none of them touch
//! session state. Inbound frames are forwarded to one event loop that owns the
//! [`session::Session`] and applies requests one at a time in arrival order,
//! so there are no locks and every broadcast reflects a consistent snapshot.
//!
//! ### Bounded Outbound Queues
//! Every connection has a bounded queue of pending frames. Broadcasts never
//! wait on a socket: a connection whose queue is full is dropped instead of
//! stalling everyone else.
//!
//! ## Module Organization
//!
//! - `registry`: joined participants, their state and join order
//! - `validation`: raw frame parsing and request validation
//! - `dispatcher`: open connections and outbound fan-out
//! - `moderation`: privileged listing and eviction
//! - `session`: the request pipeline tying the above together
//! - `network`: WebSocket transport and the server event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod moderation;
pub mod network;
pub mod registry;
pub mod session;
pub mod utils;
pub mod validation;
