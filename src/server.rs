//! WebSocket server: lifecycle glue around the poller and the hub.
//!
//! Each accepted connection becomes a [`WsObserver`] registered with the
//! hub for as long as the socket is open. Outbound frames go through a
//! bounded per-connection queue drained by a writer task, so a slow client
//! only ever fills its own queue; once it is full, further messages for
//! that client are dropped instead of waited on. Inbound text frames are
//! decoded, applied to the shared state, and answered with a REPLY
//! broadcast to everyone.

use crate::config::Config;
use crate::error::{BroadcastWriteError, DecodeError, Result, ServerError};
use crate::hub::{BroadcastReport, ConnectionHub, Observer, ObserverId};
use crate::poller::SensorPoller;
use crate::protocol::{apply_inbound, decode_inbound, encode_reply};
use crate::sensors::SensorLine;
use crate::state::SharedDeviceState;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for connections to close before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Observer backed by a WebSocket connection's outbound queue.
pub struct WsObserver {
    id: ObserverId,
    peer: SocketAddr,
    outbound: mpsc::Sender<Message>,
}

impl WsObserver {
    pub fn new(peer: SocketAddr, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id: ObserverId::new(),
            peer,
            outbound,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Observer for WsObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    async fn write_message(&self, message: &str) -> std::result::Result<(), BroadcastWriteError> {
        self.outbound
            .try_send(Message::Text(message.to_owned().into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => BroadcastWriteError::QueueFull,
                TrySendError::Closed(_) => BroadcastWriteError::Closed,
            })
    }
}

/// Owns the shared state and the hub, and runs the listener and poller.
pub struct Server {
    config: Config,
    state: Arc<SharedDeviceState>,
    hub: Arc<ConnectionHub>,
    /// Held from applying a client update until its REPLY is queued, so
    /// REPLYs go out in the order the updates were applied.
    reply_order: Mutex<()>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(ConnectionHub::new(config.broadcast.write_timeout()));
        Self {
            config,
            state: Arc::new(SharedDeviceState::new()),
            hub,
            reply_order: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<SharedDeviceState> {
        &self.state
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        info!("[Server] Listening on ws://{}{}", addr, self.config.server.ws_path);
        Ok(listener)
    }

    /// Handle one inbound text frame from any client.
    ///
    /// A payload that fails to decode is rejected without touching state
    /// and without a REPLY.
    pub async fn on_message(&self, raw: &str) -> std::result::Result<BroadcastReport, DecodeError> {
        info!("[Server] Got message {:?}", raw);
        let message = decode_inbound(raw)?;
        let _ordered = self.reply_order.lock().await;
        let snapshot = apply_inbound(
            &self.state,
            &message,
            self.config.server.accept_client_open,
        );
        Ok(self
            .hub
            .broadcast(&encode_reply(snapshot.armed, snapshot.enabled))
            .await)
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// The poller runs alongside; a sensor fault stops only the poller and
    /// connections keep being served.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        line: Box<dyn SensorLine>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let poller = SensorPoller::new(
            self.state.clone(),
            self.hub.clone(),
            line,
            self.config.sensor.poll_interval(),
        );
        let poller_task = tokio::spawn(poller.run(shutdown.child_token()));

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("[Server] Accepted TCP connection from {}", peer);
                        let server = self.clone();
                        let token = shutdown.child_token();
                        connections.spawn(async move {
                            server.handle_connection(stream, peer, token).await;
                        });
                    }
                    Err(e) => warn!("[Server] Failed to accept connection: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(
            "[Server] Shutting down, closing {} connection(s)",
            connections.len()
        );
        drop(listener);

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("[Server] Connections did not close in time, aborting");
            connections.abort_all();
        }

        match poller_task.await {
            Ok(Ok(())) => {}
            // Already logged by the poller when it happened
            Ok(Err(_)) => {}
            Err(e) => error!("[Server] Poller task failed: {}", e),
        }

        info!("[Server] Stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let ws_path = self.config.server.ws_path.clone();
        let route = move |request: &Request,
                          response: Response|
              -> std::result::Result<Response, ErrorResponse> {
            let path = request.uri().path();
            if path == ws_path {
                Ok(response)
            } else {
                let mut rejection =
                    ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws = match accept_hdr_async(stream, route).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("[Server] WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };

        let (mut sink, mut source) = ws.split();
        let (tx, mut rx) = mpsc::channel::<Message>(self.config.broadcast.outbound_queue);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!("[Server] Write to {} failed: {}", peer, e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let observer = Arc::new(WsObserver::new(peer, tx));
        let id = observer.id();
        info!("[Server] Observer {} connected from {}", id, observer.peer());
        self.hub.register(observer);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = &text;
                        if let Err(e) = self.on_message(text_str).await {
                            warn!("[Server] Rejected message from {}: {}", peer, e);
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("[Server] Ignoring binary frame from {}", peer);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("[Server] Connection error from {}: {}", peer, e);
                        break;
                    }
                }
            }
        }

        // Dropping the hub's handle closes the queue, which ends the writer
        self.hub.unregister(id);
        if tokio::time::timeout(self.config.broadcast.write_timeout() * 2, writer)
            .await
            .is_err()
        {
            debug!("[Server] Writer for {} still draining, detaching", peer);
        }
        info!("[Server] Observer {} disconnected", id);
    }
}
