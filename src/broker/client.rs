use super::config::BrokerConfig;
use super::{CommandSink, ConnectionError, MessageHandler, PublishError, PublishOptions};
use crate::link::{Backoff, ConnectionState};
use crate::topic::TopicTable;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

/// Broker link state plus the error that caused the last loss, if any
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub last_error: Option<ConnectionError>,
}

/// Owner of the single broker connection.
///
/// Cloning shares the same connection. The connection state lives in one
/// place (the watch channel below) and is read through [`BrokerClient::state`].
#[derive(Clone)]
pub struct BrokerClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: BrokerConfig,
    topics: TopicTable,
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    status_tx: watch::Sender<LinkStatus>,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Build MQTT options: credentials, keep-alive, transport and the retained
/// "offline" last will on the status topic.
pub(crate) fn mqtt_options(config: &BrokerConfig, topics: &TopicTable) -> MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("beacon-{}", Uuid::new_v4().simple()));

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }
    options.set_last_will(LastWill::new(topics.status(), OFFLINE, QoS::AtMostOnce, true));
    if config.tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

impl BrokerClient {
    /// Prepare the link. No I/O happens until [`BrokerClient::connect`].
    pub fn new(config: BrokerConfig, topics: TopicTable) -> Self {
        let options = mqtt_options(&config, &topics);
        let (client, eventloop) = AsyncClient::new(options, config.request_capacity.max(1));
        let (status_tx, _) = watch::channel(LinkStatus::default());
        let (shutdown_tx, _) = watch::channel(false);
        let subscriptions = topics
            .subscriptions()
            .into_iter()
            .map(|topic| (topic, QoS::AtMostOnce))
            .collect();

        Self {
            inner: Arc::new(Inner {
                config,
                topics,
                client,
                eventloop: Mutex::new(Some(eventloop)),
                status_tx,
                shutdown_tx,
                shutting_down: AtomicBool::new(false),
                subscriptions: Mutex::new(subscriptions),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start the link and wait for the first connection outcome.
    ///
    /// The read loop keeps running (and retrying) whatever this returns; an
    /// error only reports that the first attempt did not succeed in time.
    pub async fn connect(&self, handler: Arc<dyn MessageHandler>) -> Result<(), ConnectionError> {
        let eventloop = lock(&self.inner.eventloop)
            .take()
            .ok_or(ConnectionError::AlreadyStarted)?;

        info!(
            host = %self.inner.config.host,
            port = self.inner.config.port,
            tls = self.inner.config.tls,
            "Connecting to MQTT broker"
        );

        let mut status_rx = self.inner.status_tx.subscribe();
        let handle = tokio::spawn(run_event_loop(Arc::clone(&self.inner), eventloop, handler));
        *lock(&self.inner.task) = Some(handle);

        let first_outcome = async {
            loop {
                if status_rx.changed().await.is_err() {
                    return Err(ConnectionError::Closed);
                }
                let status = status_rx.borrow_and_update().clone();
                match status.state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Reconnecting => {
                        return Err(status
                            .last_error
                            .unwrap_or_else(|| ConnectionError::Transport("connection lost".to_string())))
                    }
                    ConnectionState::Disconnected if self.is_shutting_down() => {
                        return Err(ConnectionError::Closed)
                    }
                    _ => continue,
                }
            }
        };

        match timeout(self.inner.config.connect_timeout(), first_outcome).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Add a subscription. Sent now if connected, and re-sent after every reconnect.
    pub fn subscribe(&self, pattern: &str, qos: QoS) -> Result<(), PublishError> {
        lock(&self.inner.subscriptions).push((pattern.to_string(), qos));
        if !self.is_connected() {
            return Ok(());
        }
        self.inner
            .client
            .try_subscribe(pattern, qos)
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status_tx.borrow().state
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Watch link status changes
    pub fn watch(&self) -> watch::Receiver<LinkStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn topics(&self) -> &TopicTable {
        &self.inner.topics
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Clean shutdown: publish retained "offline", disconnect, stop the loop.
    ///
    /// Bounded by the configured shutdown timeout; past it the loop is
    /// aborted and the broker's last will covers the status.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(true);
        let was_connected = self.is_connected();
        let mut handle = lock(&self.inner.task).take();

        let sequence = async {
            if was_connected {
                info!(topic = %self.inner.topics.status(), "Publishing offline status before disconnect");
                if let Err(e) = self
                    .inner
                    .client
                    .publish(self.inner.topics.status(), QoS::AtMostOnce, true, OFFLINE)
                    .await
                {
                    warn!(error = %e, "Failed to queue offline status");
                }
                if let Err(e) = self.inner.client.disconnect().await {
                    warn!(error = %e, "Failed to queue broker disconnect");
                }
            }
            if let Some(handle) = handle.as_mut() {
                if let Err(e) = handle.await {
                    warn!(error = %e, "MQTT read loop ended abnormally");
                }
            }
        };

        if timeout(self.inner.config.shutdown_timeout(), sequence).await.is_err() {
            warn!("Broker shutdown timed out, relying on last will");
            if let Some(handle) = handle {
                handle.abort();
            }
        }

        self.inner.set_status(ConnectionState::Disconnected, None);
        info!("Broker link closed");
    }
}

impl CommandSink for BrokerClient {
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn publish(&self, topic: &str, payload: &str, options: PublishOptions) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }

        debug!(topic = %topic, retain = options.retain, "Publishing to broker");

        self.inner
            .client
            .try_publish(topic, options.qos, options.retain, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }
}

impl Inner {
    fn set_status(&self, state: ConnectionState, last_error: Option<ConnectionError>) {
        self.status_tx.send_modify(|status| {
            status.state = state;
            if last_error.is_some() || state.is_connected() {
                status.last_error = last_error;
            }
        });
    }

    fn transition(
        &self,
        next: impl FnOnce(ConnectionState) -> ConnectionState,
        last_error: Option<ConnectionError>,
        handler: &dyn MessageHandler,
    ) {
        let current = self.status_tx.borrow().state;
        let state = next(current);
        if state != current {
            debug!(from = %current, to = %state, "Broker link state change");
        }
        self.set_status(state, last_error);
        handler.on_link_change(state);
    }

    /// Retained "online", then the subscription set. Non-blocking: runs
    /// inside the read loop.
    fn announce(&self) {
        if let Err(e) = self
            .client
            .try_publish(self.topics.status(), QoS::AtMostOnce, true, ONLINE)
        {
            error!(error = %e, "Failed to queue online status");
        }

        for (topic, qos) in lock(&self.subscriptions).iter() {
            match self.client.try_subscribe(topic.as_str(), *qos) {
                Ok(()) => info!(topic = %topic, "Subscribed"),
                Err(e) => error!(topic = %topic, error = %e, "Failed to subscribe"),
            }
        }
    }
}

/// Broker read loop: the only reader of the connection.
///
/// Each inbound publish goes to the handler before the next packet is read.
async fn run_event_loop(inner: Arc<Inner>, mut eventloop: EventLoop, handler: Arc<dyn MessageHandler>) {
    let mut backoff = Backoff::new(
        inner.config.reconnect_delay(),
        inner.config.max_reconnect_delay(),
    );
    let mut shutdown_rx = inner.shutdown_tx.subscribe();

    inner.transition(ConnectionState::on_attempt, None, handler.as_ref());

    loop {
        let connected = inner.status_tx.borrow().state.is_connected();
        let event = if connected {
            // Connected: shutdown flows through offline + DISCONNECT
            eventloop.poll().await
        } else {
            if inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            // Still dialing: shutdown must not wait out the attempt
            tokio::select! {
                event = eventloop.poll() => event,
                _ = shutdown_rx.changed() => break,
            }
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                info!("Connected to MQTT broker");
                inner.transition(ConnectionState::on_established, None, handler.as_ref());
                inner.announce();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handler.on_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect sent to MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }

                let delay = backoff.next_delay();
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "MQTT broker connection lost"
                );
                inner.transition(
                    ConnectionState::on_lost,
                    Some(ConnectionError::from(&e)),
                    handler.as_ref(),
                );

                // Single-shot reconnect timer, cancelled by shutdown
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                inner.transition(ConnectionState::on_attempt, None, handler.as_ref());
            }
        }
    }

    inner.transition(ConnectionState::on_closed, None, handler.as_ref());
    info!("MQTT read loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BrokerClient {
        BrokerClient::new(
            BrokerConfig::default(),
            TopicTable::new("m2ccm", "noa/g22315333").unwrap(),
        )
    }

    #[test]
    fn test_last_will_is_retained_offline_on_status_topic() {
        let topics = TopicTable::new("m2ccm", "noa/g22315333").unwrap();
        let options = mqtt_options(&BrokerConfig::default(), &topics);
        let will = options.last_will().expect("last will registered");
        assert_eq!(will.topic, "m2ccm/noa/g22315333/statut");
        assert_eq!(&will.message[..], b"offline");
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtMostOnce);
    }

    #[test]
    fn test_configured_client_id_and_address() {
        let config = BrokerConfig {
            host: "broker.example".to_string(),
            port: 8883,
            client_id: Some("bridge-1".to_string()),
            ..BrokerConfig::default()
        };
        let topics = TopicTable::new("m2ccm", "noa/g22315333").unwrap();
        let options = mqtt_options(&config, &topics);
        assert_eq!(options.client_id(), "bridge-1");
        assert_eq!(options.broker_address(), ("broker.example".to_string(), 8883));
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert_eq!(client.status().last_error, None);
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails() {
        let client = client();
        let result = client.publish(
            "m2ccm/noa/g22315333/command/led",
            "on",
            PublishOptions::fire_and_forget(),
        );
        assert_eq!(result, Err(PublishError::NotConnected));
        assert_eq!(result.unwrap_err().to_string(), "broker not connected");
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_is_deferred() {
        let client = client();
        assert!(client.subscribe("m2ccm/extra/#", QoS::AtMostOnce).is_ok());
        let subs = lock(&client.inner.subscriptions);
        assert_eq!(subs.len(), 6);
        assert_eq!(subs.last().unwrap().0, "m2ccm/extra/#");
    }

    #[tokio::test]
    async fn test_shutdown_without_connect_is_quick() {
        let client = client();
        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        // Idempotent
        client.shutdown().await;
    }
}
