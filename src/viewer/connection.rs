use super::ViewerConfig;
use crate::bridge::{CommandEnvelope, ServerFrame};
use crate::link::ConnectionState;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Outbound commands buffered for the live socket only
const COMMAND_QUEUE: usize = 32;

/// Why a command was not sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Not connected to the bridge; the command is dropped, not queued
    NotConnected,
    /// Session queue full
    Busy,
    Encode(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotConnected => write!(f, "viewer not connected to bridge"),
            SendError::Busy => write!(f, "viewer command queue full"),
            SendError::Encode(reason) => write!(f, "failed to encode command: {}", reason),
        }
    }
}

impl std::error::Error for SendError {}

/// Reconnecting WebSocket session to the bridge.
///
/// Received frames are forwarded to the channel given at start. The reconnect
/// loop never gives up; each wait is one timer that shutdown cancels.
#[derive(Clone)]
pub struct ViewerConnection {
    inner: Arc<Inner>,
}

struct Inner {
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    /// Command queue of the current session, present only while connected
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ViewerConnection {
    /// Spawn the connection loop
    pub fn start(config: ViewerConfig, frames: mpsc::Sender<ServerFrame>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            state_tx,
            shutdown_tx,
            outbound: Mutex::new(None),
            task: Mutex::new(None),
        });

        let handle = tokio::spawn(run(Arc::clone(&inner), config, frames));
        *lock(&inner.task) = Some(handle);
        Self { inner }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Send a command to the bridge. Logged no-op unless connected.
    pub fn send(&self, command: &CommandEnvelope) -> Result<(), SendError> {
        let tx = match (self.state(), lock(&self.inner.outbound).clone()) {
            (ConnectionState::Connected, Some(tx)) => tx,
            (state, _) => {
                warn!(topic = %command.topic, state = %state, "Command not sent, bridge not connected");
                return Err(SendError::NotConnected);
            }
        };

        let text = serde_json::to_string(command).map_err(|e| SendError::Encode(e.to_string()))?;
        tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Busy,
            mpsc::error::TrySendError::Closed(_) => SendError::NotConnected,
        })
    }

    /// Cancel any pending reconnect, close the socket and wait for the loop to end.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Viewer connection task failed");
            }
        }
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Viewer link state change");
            *current = state;
            true
        });
    }
}

async fn run(inner: Arc<Inner>, config: ViewerConfig, frames: mpsc::Sender<ServerFrame>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();

    loop {
        inner.set_state(ConnectionState::Connecting);
        info!(url = %config.url, "Connecting to bridge");

        let connected = tokio::select! {
            result = connect_async(config.url.as_str()) => Some(result),
            _ = shutdown_rx.changed() => None,
        };

        match connected {
            Some(Ok((stream, _))) => {
                let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
                *lock(&inner.outbound) = Some(tx);
                inner.set_state(ConnectionState::Connected);
                info!(url = %config.url, "Connected to bridge");

                let keep_going = session(stream, rx, &frames, &mut shutdown_rx).await;

                // Pending commands die with the session
                lock(&inner.outbound).take();
                inner.set_state(ConnectionState::Disconnected);
                info!("Disconnected from bridge");
                if !keep_going {
                    break;
                }
            }
            Some(Err(e)) => {
                inner.set_state(ConnectionState::Disconnected);
                warn!(url = %config.url, error = %e, "Bridge connection failed");
            }
            None => break,
        }

        if *shutdown_rx.borrow() {
            break;
        }

        // Single-shot reconnect timer, cancelled by shutdown
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay()) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    lock(&inner.outbound).take();
    inner.set_state(ConnectionState::Disconnected);
    info!("Viewer connection stopped");
}

/// Returns false when the whole connection should stop
async fn session<S>(
    mut stream: S,
    mut commands: mpsc::Receiver<String>,
    frames: &mpsc::Sender<ServerFrame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(frame) => {
                                if frames.send(frame).await.is_err() {
                                    debug!("Frame consumer gone");
                                    let _ = stream.close().await;
                                    return false;
                                }
                            }
                            Err(e) => warn!(error = %e, "Unreadable frame from bridge"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if stream.send(Message::Pong(data)).await.is_err() {
                            return true;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return true,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Bridge WebSocket error");
                        return true;
                    }
                }
            }

            Some(text) = commands.recv() => {
                if let Err(e) = stream.send(Message::Text(text.into())).await {
                    warn!(error = %e, "Failed to send command");
                    return true;
                }
            }

            _ = shutdown_rx.changed() => {
                let _ = stream.close().await;
                return false;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
