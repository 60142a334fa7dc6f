//! Outbound fan-out to open connections.
//!
//! Every open connection, joined or not, has an entry here holding the
//! sending half of its bounded outbound queue. Frames are serialized once and
//! pushed with `try_send`, so a slow receiver never stalls the event loop:
//! when its queue is full the connection is dropped instead. Dropped ids are
//! kept until the owner collects them with [`Dispatcher::take_dropped`].

use crate::utils::generate_connection_id;
use log::{debug, error, info, warn};
use shared::{ConnectionId, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Server-side end of one open connection
#[derive(Debug)]
pub struct ConnectionHandle {
    pub addr: SocketAddr,
    sender: mpsc::Sender<Message>,
    // Dropping this tells the connection task to tear the transport down.
    _shutdown: oneshot::Sender<()>,
    /// Set once a close frame is queued; nothing else is sent afterwards.
    closing: bool,
}

impl ConnectionHandle {
    pub fn new(
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            addr,
            sender,
            _shutdown: shutdown,
            closing: false,
        }
    }
}

enum Delivery {
    Queued,
    Overflowed,
    Closed,
}

pub struct Dispatcher {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    max_connections: usize,
    dropped: Vec<ConnectionId>,
}

impl Dispatcher {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
            dropped: Vec::new(),
        }
    }

    /// Registers an open connection and assigns it a fresh identifier
    ///
    /// Returns None if the server is at capacity.
    pub fn register(&mut self, handle: ConnectionHandle) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let mut id = generate_connection_id();
        while self.connections.contains_key(&id) {
            id = generate_connection_id();
        }

        info!("Connection {} opened from {}", id, handle.addr);
        self.connections.insert(id.clone(), handle);
        Some(id)
    }

    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        if let Some(handle) = self.connections.remove(id) {
            info!("Connection {} from {} closed", id, handle.addr);
            true
        } else {
            false
        }
    }

    /// Delivers a message to every open connection, sender included
    pub fn broadcast_all(&mut self, message: &ServerMessage) {
        let Some(frame) = encode(message) else {
            return;
        };

        let mut dropped = Vec::new();
        for (id, handle) in self.connections.iter().filter(|(_, h)| !h.closing) {
            match deliver(handle, frame.clone()) {
                Delivery::Queued => {}
                Delivery::Overflowed => {
                    warn!(
                        "Outbound queue full for {}, dropping connection ({})",
                        id,
                        message.name()
                    );
                    dropped.push(id.clone());
                }
                Delivery::Closed => dropped.push(id.clone()),
            }
        }

        for id in dropped {
            self.drop_connection(&id);
        }
    }

    /// Delivers a message to one connection only
    ///
    /// Returns false if the connection is unknown or could not accept it.
    pub fn send_to(&mut self, id: &ConnectionId, message: &ServerMessage) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        self.push(id, frame)
    }

    /// Queues a close frame behind whatever is already pending for the connection
    pub fn close(&mut self, id: &ConnectionId) -> bool {
        let queued = self.push(id, Message::Close(None));
        if let Some(handle) = self.connections.get_mut(id) {
            handle.closing = true;
        }
        queued
    }

    /// Returns connections dropped since the last call, in drop order
    pub fn take_dropped(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.dropped)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// True for open connections that are not being closed
    pub fn is_active(&self, id: &ConnectionId) -> bool {
        self.connections
            .get(id)
            .is_some_and(|handle| !handle.closing)
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn push(&mut self, id: &ConnectionId, frame: Message) -> bool {
        let Some(handle) = self.connections.get(id).filter(|h| !h.closing) else {
            debug!("No open connection {} for targeted send", id);
            return false;
        };

        match deliver(handle, frame) {
            Delivery::Queued => true,
            Delivery::Overflowed => {
                warn!("Outbound queue full for {}, dropping connection", id);
                self.drop_connection(id);
                false
            }
            Delivery::Closed => {
                self.drop_connection(id);
                false
            }
        }
    }

    fn drop_connection(&mut self, id: &ConnectionId) {
        if self.unregister(id) {
            self.dropped.push(id.clone());
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to serialize {} message: {}", message.name(), e);
            None
        }
    }
}

fn deliver(handle: &ConnectionHandle, frame: Message) -> Delivery {
    match handle.sender.try_send(frame) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => Delivery::Overflowed,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080)
    }

    struct TestConnection {
        receiver: mpsc::Receiver<Message>,
        shutdown: oneshot::Receiver<()>,
    }

    fn open(dispatcher: &mut Dispatcher, capacity: usize) -> (ConnectionId, TestConnection) {
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown) = oneshot::channel();
        let id = dispatcher
            .register(ConnectionHandle::new(test_addr(), sender, shutdown_tx))
            .expect("dispatcher at capacity");
        (id, TestConnection { receiver, shutdown })
    }

    fn received(connection: &mut TestConnection) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = connection.receiver.try_recv() {
            if let Message::Text(text) = frame {
                messages.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        messages
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, _conn_a) = open(&mut dispatcher, 4);
        let (b, _conn_b) = open(&mut dispatcher, 4);

        assert_ne!(a, b);
        assert_eq!(dispatcher.len(), 2);
        assert!(dispatcher.contains(&a));
    }

    #[test]
    fn test_register_respects_capacity() {
        let mut dispatcher = Dispatcher::new(1);
        let (_a, _conn_a) = open(&mut dispatcher, 4);

        let (sender, _receiver) = mpsc::channel(4);
        let (shutdown, _shutdown_rx) = oneshot::channel();
        let rejected = dispatcher.register(ConnectionHandle::new(test_addr(), sender, shutdown));

        assert!(rejected.is_none());
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let mut dispatcher = Dispatcher::new(10);
        let (_a, mut conn_a) = open(&mut dispatcher, 4);
        let (_b, mut conn_b) = open(&mut dispatcher, 4);

        dispatcher.broadcast_all(&ServerMessage::ParticipantList(vec![]));

        assert_eq!(received(&mut conn_a), vec![ServerMessage::ParticipantList(vec![])]);
        assert_eq!(received(&mut conn_b), vec![ServerMessage::ParticipantList(vec![])]);
    }

    #[test]
    fn test_send_to_targets_one_connection() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, mut conn_a) = open(&mut dispatcher, 4);
        let (_b, mut conn_b) = open(&mut dispatcher, 4);

        assert!(dispatcher.send_to(&a, &ServerMessage::Evicted));

        assert_eq!(received(&mut conn_a), vec![ServerMessage::Evicted]);
        assert!(received(&mut conn_b).is_empty());
        assert!(!dispatcher.send_to(&ConnectionId::new("missing"), &ServerMessage::Evicted));
    }

    #[test]
    fn test_frames_arrive_in_dispatch_order() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, mut conn_a) = open(&mut dispatcher, 8);

        for rotation in 0..5 {
            dispatcher.broadcast_all(&ServerMessage::Rotated {
                id: a.clone(),
                rotation: rotation as f64,
            });
        }

        let rotations: Vec<f64> = received(&mut conn_a)
            .into_iter()
            .map(|message| match message {
                ServerMessage::Rotated { rotation, .. } => rotation,
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        assert_eq!(rotations, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_slow_receiver_is_dropped_without_blocking_others() {
        let mut dispatcher = Dispatcher::new(10);
        let (slow, mut slow_conn) = open(&mut dispatcher, 1);
        let (fast, mut fast_conn) = open(&mut dispatcher, 16);

        for _ in 0..3 {
            dispatcher.broadcast_all(&ServerMessage::ParticipantList(vec![]));
        }

        assert!(!dispatcher.contains(&slow));
        assert!(dispatcher.contains(&fast));
        assert_eq!(received(&mut fast_conn).len(), 3);
        assert_eq!(dispatcher.take_dropped(), vec![slow.clone()]);
        assert!(dispatcher.take_dropped().is_empty());

        // The dropped handle releases the shutdown signal
        assert!(matches!(
            slow_conn.shutdown.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
        assert_eq!(received(&mut slow_conn).len(), 1);
    }

    #[test]
    fn test_closed_receiver_is_unregistered() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, conn_a) = open(&mut dispatcher, 4);
        drop(conn_a);

        dispatcher.broadcast_all(&ServerMessage::ParticipantList(vec![]));

        assert!(!dispatcher.contains(&a));
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.take_dropped(), vec![a]);
    }

    #[test]
    fn test_close_is_queued_after_pending_frames() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, mut conn_a) = open(&mut dispatcher, 4);

        dispatcher.send_to(&a, &ServerMessage::Evicted);
        dispatcher.close(&a);

        assert!(matches!(conn_a.receiver.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(conn_a.receiver.try_recv(), Ok(Message::Close(None))));

        dispatcher.broadcast_all(&ServerMessage::ParticipantList(vec![]));
        assert!(!dispatcher.send_to(&a, &ServerMessage::Evicted));
        assert!(conn_a.receiver.try_recv().is_err());
        assert!(dispatcher.contains(&a));
        assert!(!dispatcher.is_active(&a));
    }

    #[test]
    fn test_unregister() {
        let mut dispatcher = Dispatcher::new(10);
        let (a, _conn_a) = open(&mut dispatcher, 4);

        assert!(dispatcher.unregister(&a));
        assert!(!dispatcher.unregister(&a));
        assert!(dispatcher.is_empty());
        // Explicit removal is not reported as a drop
        assert!(dispatcher.take_dropped().is_empty());
    }
}
