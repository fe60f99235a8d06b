use super::protocol::{CommandEnvelope, ServerFrame};
use super::registry::{BroadcastReport, Frame, ViewerId, ViewerRegistry};
use crate::broker::{CommandSink, MessageHandler, PublishError, PublishOptions};
use crate::link::ConnectionState;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Why a command was not handed to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Topic or message missing or empty
    MissingFields,
    /// Broker link down; the command is dropped, not queued
    BrokerNotConnected,
    Internal(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::MissingFields => write!(f, "topic and message are required"),
            RelayError::BrokerNotConnected => write!(f, "broker not connected"),
            RelayError::Internal(reason) => write!(f, "internal error: {}", reason),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<PublishError> for RelayError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::NotConnected => RelayError::BrokerNotConnected,
            PublishError::Rejected(reason) => RelayError::Internal(reason),
        }
    }
}

/// Synchronous status read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub broker_connected: bool,
    pub connected_viewer_count: usize,
}

/// Fan-out between the broker link and the registered viewers
pub struct BridgeServer {
    registry: ViewerRegistry,
    sink: Arc<dyn CommandSink>,
    closing: watch::Sender<bool>,
    /// Serializes link-change broadcasts with a new viewer's state check
    link: Mutex<()>,
}

impl BridgeServer {
    pub fn new(sink: Arc<dyn CommandSink>, queue_capacity: usize) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            registry: ViewerRegistry::new(queue_capacity),
            sink,
            closing,
            link: Mutex::new(()),
        }
    }

    /// Wrap a broker message as a data frame and broadcast it.
    pub fn on_broker_message(&self, topic: &str, payload: &[u8]) -> BroadcastReport {
        let message = String::from_utf8_lossy(payload);
        debug!(topic = %topic, bytes = payload.len(), "Broker message");
        self.broadcast(&ServerFrame::data(topic, &message, Utc::now()))
    }

    /// Register a viewer and queue its initial connection frame.
    ///
    /// The frame is queued before the viewer joins the broadcast set, so it
    /// always arrives first. The link is then read again under the link lock;
    /// if it moved in between, a correcting frame follows.
    pub fn on_viewer_connect(&self) -> (ViewerId, mpsc::Receiver<Frame>) {
        let connected = self.sink.is_connected();
        let (id, rx) = match encode(&ServerFrame::connection(connected)) {
            Some(first) => self.registry.register_with(first),
            None => self.registry.register(),
        };

        let _link = self.lock_link();
        let now = self.sink.is_connected();
        if now != connected {
            debug!(viewer_id = %id, broker_connected = now, "Link moved during registration");
            self.send_to(&id, &ServerFrame::connection(now));
        }
        (id, rx)
    }

    pub fn on_viewer_disconnect(&self, id: &ViewerId) {
        self.registry.unregister(id);
    }

    /// Relay a viewer's command. Fire-and-forget: success means the publish
    /// was attempted, not delivered.
    pub fn on_viewer_command(&self, id: &ViewerId, envelope: &CommandEnvelope) -> Result<(), RelayError> {
        info!(viewer_id = %id, topic = %envelope.topic, "Viewer command");
        self.publish_command(envelope)
    }

    /// Publish surface shared by viewer commands and the HTTP API.
    pub fn publish_command(&self, envelope: &CommandEnvelope) -> Result<(), RelayError> {
        if !envelope.is_complete() {
            return Err(RelayError::MissingFields);
        }

        self.sink
            .publish(&envelope.topic, &envelope.message, PublishOptions::fire_and_forget())
            .map_err(|e| {
                warn!(topic = %envelope.topic, error = %e, "Command not relayed");
                RelayError::from(e)
            })
    }

    /// Queue a frame for one viewer only
    pub fn send_to(&self, id: &ViewerId, frame: &ServerFrame) {
        if let Some(frame) = encode(frame) {
            let _ = self.registry.send_to(id, frame);
        }
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            broker_connected: self.sink.is_connected(),
            connected_viewer_count: self.registry.len(),
        }
    }

    /// Watch for bridge shutdown; sessions close their sockets when it flips.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Ask every viewer session to close
    pub fn close_viewers(&self) {
        info!(viewers = self.registry.len(), "Closing viewer sessions");
        let _ = self.closing.send(true);
    }

    fn lock_link(&self) -> MutexGuard<'_, ()> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn broadcast(&self, frame: &ServerFrame) -> BroadcastReport {
        match encode(frame) {
            Some(frame) => self.registry.broadcast(frame),
            None => BroadcastReport::default(),
        }
    }
}

impl MessageHandler for BridgeServer {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.on_broker_message(topic, payload);
    }

    fn on_link_change(&self, state: ConnectionState) {
        let _link = self.lock_link();
        self.broadcast(&ServerFrame::connection(state.is_connected()));
    }
}

fn encode(frame: &ServerFrame) -> Option<Frame> {
    match frame.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "Failed to encode frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        connected: AtomicBool,
        published: Mutex<Vec<(String, String, PublishOptions)>>,
    }

    impl CommandSink for RecordingSink {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn publish(&self, topic: &str, payload: &str, options: PublishOptions) -> Result<(), PublishError> {
            if !self.is_connected() {
                return Err(PublishError::NotConnected);
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), options));
            Ok(())
        }
    }

    fn bridge(connected: bool) -> (BridgeServer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        sink.connected.store(connected, Ordering::SeqCst);
        (BridgeServer::new(sink.clone(), 8), sink)
    }

    fn parse(frame: &Frame) -> serde_json::Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_connect_sends_connection_frame_first() {
        let (bridge, _) = bridge(true);
        let (_id, mut rx) = bridge.on_viewer_connect();
        let first = parse(&rx.recv().await.unwrap());
        assert_eq!(first, serde_json::json!({"type": "connection", "brokerConnected": true}));
        assert_eq!(bridge.status().connected_viewer_count, 1);
    }

    #[tokio::test]
    async fn test_broker_message_broadcast_as_data_frame() {
        let (bridge, _) = bridge(true);
        let (_a, mut rx_a) = bridge.on_viewer_connect();
        let (_b, mut rx_b) = bridge.on_viewer_connect();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        let report = bridge.on_broker_message("m2ccm/noa/g22315333/data/sound", br#"{"value":42}"#);
        assert_eq!(report.delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = parse(&rx.recv().await.unwrap());
            assert_eq!(frame["type"], "data");
            assert_eq!(frame["topic"], "m2ccm/noa/g22315333/data/sound");
            assert_eq!(frame["message"], r#"{"value":42}"#);
            assert!(frame["timestamp"].as_i64().unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn test_failed_viewer_removed_other_still_receives() {
        let (bridge, _) = bridge(true);
        let (_gone, rx_gone) = bridge.on_viewer_connect();
        let (_live, mut rx_live) = bridge.on_viewer_connect();
        rx_live.recv().await.unwrap();
        drop(rx_gone);

        bridge.on_broker_message("m2ccm/noa/g22315333/statut", b"online");

        let frame = parse(&rx_live.recv().await.unwrap());
        assert_eq!(frame["message"], "online");
        assert_eq!(bridge.status().connected_viewer_count, 1);
    }

    #[test]
    fn test_command_relayed_exactly_once() {
        let (bridge, sink) = bridge(true);
        let envelope = CommandEnvelope::new("m2ccm/noa/g22315333/command/led", "on");

        assert!(bridge.publish_command(&envelope).is_ok());

        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "m2ccm/noa/g22315333/command/led");
        assert_eq!(published[0].1, "on");
        assert_eq!(published[0].2, PublishOptions::fire_and_forget());
    }

    #[test]
    fn test_command_while_disconnected_fails_without_publish() {
        let (bridge, sink) = bridge(false);
        let envelope = CommandEnvelope::new("m2ccm/noa/g22315333/command/led", "on");

        let err = bridge.publish_command(&envelope).unwrap_err();
        assert_eq!(err, RelayError::BrokerNotConnected);
        assert_eq!(err.to_string(), "broker not connected");
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[test]
    fn test_command_missing_fields() {
        let (bridge, sink) = bridge(true);
        let envelope = CommandEnvelope::new("", "on");
        assert_eq!(bridge.publish_command(&envelope), Err(RelayError::MissingFields));
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_change_pushes_connection_frame() {
        let (bridge, _) = bridge(true);
        let (_id, mut rx) = bridge.on_viewer_connect();
        rx.recv().await.unwrap();

        bridge.on_link_change(ConnectionState::Reconnecting);
        let frame = parse(&rx.recv().await.unwrap());
        assert_eq!(frame, serde_json::json!({"type": "connection", "brokerConnected": false}));
    }

    /// Flips the link up while the bridge reads it for a new viewer, the way
    /// the broker read loop can between that read and registration.
    #[derive(Default)]
    struct FlippingSink {
        connected: AtomicBool,
        bridge: std::sync::OnceLock<std::sync::Weak<BridgeServer>>,
    }

    impl CommandSink for FlippingSink {
        fn is_connected(&self) -> bool {
            let was = self.connected.swap(true, Ordering::SeqCst);
            if !was {
                if let Some(bridge) = self.bridge.get().and_then(|b| b.upgrade()) {
                    bridge.on_link_change(ConnectionState::Connected);
                    bridge.on_broker_message("m2ccm/noa/g22315333/data/sound", br#"{"value":7}"#);
                }
            }
            was
        }

        fn publish(&self, _topic: &str, _payload: &str, _options: PublishOptions) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connect_during_link_change_ends_on_current_state() {
        let sink = Arc::new(FlippingSink::default());
        let bridge = Arc::new(BridgeServer::new(sink.clone(), 8));
        sink.bridge.set(Arc::downgrade(&bridge)).unwrap();

        let (_id, mut rx) = bridge.on_viewer_connect();
        assert!(sink.is_connected());

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(parse(&frame));
        }
        assert_eq!(frames.first().unwrap()["type"], "connection");
        let last_connection = frames
            .iter()
            .rev()
            .find(|f| f["type"] == "connection")
            .unwrap();
        assert_eq!(last_connection["brokerConnected"], true);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let (bridge, _) = bridge(false);
        let (id, _rx) = bridge.on_viewer_connect();
        bridge.on_viewer_disconnect(&id);
        assert_eq!(
            bridge.status(),
            BridgeStatus {
                broker_connected: false,
                connected_viewer_count: 0
            }
        );
    }
}
