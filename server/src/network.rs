//! Server network layer handling WebSocket connections and the session event loop

use crate::config::ServerConfig;
use crate::dispatcher::ConnectionHandle;
use crate::session::Session;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ConnectionId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        handle: ConnectionHandle,
        reply: oneshot::Sender<Option<ConnectionId>>,
    },
    Frame {
        id: ConnectionId,
        text: String,
    },
    Disconnected {
        id: ConnectionId,
    },
}

/// Aborts the accept task when the server loop ends or is dropped
struct AcceptorGuard(JoinHandle<()>);

impl Drop for AcceptorGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Main server owning the listener and the session state
pub struct Server {
    listener: Arc<TcpListener>,
    config: ServerConfig,
    session: Session,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener: Arc::new(listener),
            session: Session::new(&config),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that accepts TCP connections and hands each to its own task
    fn spawn_acceptor(&self, events: mpsc::UnboundedSender<ServerEvent>) -> AcceptorGuard {
        let listener = Arc::clone(&self.listener);
        let outbound_buffer = self.config.outbound_buffer;

        AcceptorGuard(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            events.clone(),
                            outbound_buffer,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    /// Main server loop; the only place session state is touched
    pub async fn run(mut self) -> Result<(), ServerError> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _acceptor = self.spawn_acceptor(event_tx);

        let mut stats_interval = interval(self.config.stats_interval.max(Duration::from_secs(1)));
        // Skip the first tick since it fires immediately
        stats_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(ServerEvent::Connected { handle, reply }) => {
                            let id = self.session.connect(handle);
                            if let Err(Some(id)) = reply.send(id) {
                                // The connection task went away before it learned its id
                                self.session.disconnect(&id);
                            }
                        }
                        Some(ServerEvent::Frame { id, text }) => {
                            self.session.handle_frame(&id, &text);
                        }
                        Some(ServerEvent::Disconnected { id }) => {
                            self.session.disconnect(&id);
                        }
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = stats_interval.tick() => {
                    info!(
                        "{} open connections, {} participants",
                        self.session.connection_count(),
                        self.session.participant_count()
                    );
                },
            }
        }

        Ok(())
    }
}

/// Drives one WebSocket connection until either side ends it
///
/// Inbound text frames are forwarded to the server loop; outbound frames are
/// drained from the connection's queue by a separate writer task so a slow
/// socket only ever backs up its own queue.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    outbound_buffer: usize,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut source) = ws_stream.split();

    let (sender, mut outbound) = mpsc::channel::<Message>(outbound_buffer.max(1));
    let (shutdown_tx, mut shutdown) = oneshot::channel();
    let (reply_tx, reply_rx) = oneshot::channel();

    let connected = ServerEvent::Connected {
        handle: ConnectionHandle::new(addr, sender, shutdown_tx),
        reply: reply_tx,
    };
    if events.send(connected).is_err() {
        return;
    }

    let id = match reply_rx.await {
        Ok(Some(id)) => id,
        Ok(None) => {
            info!("Rejecting connection from {}: server full", addr);
            let frame = CloseFrame {
                code: CloseCode::Again,
                reason: "Server full".into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return;
        }
        Err(_) => return,
    };

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = sink.send(frame).await {
                debug!("Write to {} failed: {}", addr, e);
                return;
            }
            if closing {
                return;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = ServerEvent::Frame {
                            id: id.clone(),
                            text: text.as_str().to_owned(),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary frames are not part of the protocol; pings are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Read from {} failed: {}", id, e);
                        break;
                    }
                }
            },
            _ = &mut shutdown => {
                debug!("Connection {} dropped by the server", id);
                break;
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    let _ = events.send(ServerEvent::Disconnected { id });
}
