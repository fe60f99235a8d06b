use super::protocol::{CommandEnvelope, ServerFrame};
use super::registry::{Frame, ViewerId};
use super::server::BridgeServer;
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Drives one viewer's WebSocket: drains its outbound queue and relays its commands
pub struct ViewerSession {
    id: ViewerId,
    bridge: Arc<BridgeServer>,
}

impl ViewerSession {
    /// Register with the bridge; the initial connection frame is already queued.
    pub fn open(bridge: Arc<BridgeServer>) -> (Self, mpsc::Receiver<Frame>) {
        let (id, rx) = bridge.on_viewer_connect();
        (Self { id, bridge }, rx)
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Handle WebSocket connection lifecycle
    pub async fn run(self, mut socket: WebSocket, mut outbound: mpsc::Receiver<Frame>) {
        info!(viewer_id = %self.id, "Viewer session started");
        let mut closing = self.bridge.closing();
        // Opened after close_viewers: the flip is already marked seen
        let already_closing = *closing.borrow();
        if already_closing {
            info!(viewer_id = %self.id, "Bridge closing, turning viewer away");
            let _ = socket.send(Message::Close(None)).await;
        } else {
            loop {
                tokio::select! {
                    // Frames queued by the bridge
                    frame = outbound.recv() => {
                        match frame {
                            Some(frame) => {
                                if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                                    warn!(viewer_id = %self.id, error = %e, "Failed to send frame");
                                    break;
                                }
                            }
                            None => {
                                // Registry dropped us (lagging or closed)
                                info!(viewer_id = %self.id, "Viewer removed from registry");
                                break;
                            }
                        }
                    }

                    // Commands from the viewer
                    Some(msg) = socket.recv() => {
                        match msg {
                            Ok(Message::Text(text)) => self.handle_command(&text),
                            Ok(Message::Close(_)) => {
                                info!(viewer_id = %self.id, "Viewer disconnected");
                                break;
                            }
                            Ok(Message::Ping(data)) => {
                                if let Err(e) = socket.send(Message::Pong(data)).await {
                                    error!(viewer_id = %self.id, error = %e, "Failed to send pong");
                                    break;
                                }
                            }
                            Ok(_) => {
                                // Ignore binary, pong messages
                            }
                            Err(e) => {
                                warn!(viewer_id = %self.id, error = %e, "WebSocket error");
                                break;
                            }
                        }
                    }

                    _ = closing.changed() => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }

                    else => {
                        break;
                    }
                }
            }
        }

        self.bridge.on_viewer_disconnect(&self.id);
        info!(viewer_id = %self.id, "Viewer session closed");
    }

    fn handle_command(&self, text: &str) {
        let envelope: CommandEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(viewer_id = %self.id, error = %e, "Malformed viewer command");
                self.bridge.send_to(&self.id, &ServerFrame::error("malformed command"));
                return;
            }
        };

        if let Err(e) = self.bridge.on_viewer_command(&self.id, &envelope) {
            self.bridge.send_to(&self.id, &ServerFrame::error(e));
        }
    }
}
