use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::command::{CommandPublisher, PublishError};
use crate::config::Config;
use crate::ingest::BusMessage;
use crate::stats::BridgeStats;
use crate::topic::TopicLayout;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 32;

/// Single broker connection shared by the subscriber loop and command
/// publishing. rumqttc reconnects on the next poll after an error; every
/// CONNACK re-issues the subscriptions because sessions are clean.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    command_qos: QoS,
    stats: Arc<BridgeStats>,
}

impl MqttBus {
    pub fn start(
        config: &Config,
        layout: &TopicLayout,
        tx: mpsc::Sender<BusMessage>,
        stats: Arc<BridgeStats>,
    ) -> (Self, JoinHandle<()>) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            layout.subscriptions(),
            tx,
            stats.clone(),
        ));
        let bus = Self {
            client,
            command_qos: config.command_qos,
            stats,
        };
        (bus, handle)
    }
}

#[async_trait]
impl CommandPublisher for MqttBus {
    async fn publish(&self, topic: &str, payload: &'static [u8]) -> Result<(), PublishError> {
        if !self.stats.mqtt_connected.load(Ordering::Relaxed) {
            return Err(PublishError("MQTT broker not connected".to_string()));
        }
        // try_publish never waits on a full request queue.
        self.client
            .try_publish(topic, self.command_qos, false, payload)
            .map_err(|err| PublishError(err.to_string()))
    }
}

fn mqtt_options(config: &Config) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt_username {
        options.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }
    options
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    filters: Vec<String>,
    tx: mpsc::Sender<BusMessage>,
    stats: Arc<BridgeStats>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                stats.set_mqtt_connected(true);
                tracing::info!("connected to MQTT broker");
                for filter in &filters {
                    // The event loop is this task, so the request must not wait.
                    match client.try_subscribe(filter.clone(), QoS::AtMostOnce) {
                        Ok(()) => tracing::info!(topic=%filter, "subscribed"),
                        Err(err) => {
                            tracing::warn!(error=%err, topic=%filter, "failed to subscribe")
                        }
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                tracing::trace!(topic=%publish.topic, bytes = publish.payload.len(), "received message");
                if !forward(&tx, &stats, publish.topic, publish.payload) {
                    tracing::error!("ingest worker gone; stopping MQTT listener");
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                stats.set_mqtt_connected(false);
                tracing::warn!(error=%err, "MQTT connection dropped; reconnecting");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Hands a message to the ingest worker. A full queue drops the message;
/// returns false once the worker has gone away.
fn forward(
    tx: &mpsc::Sender<BusMessage>,
    stats: &BridgeStats,
    topic: String,
    payload: Bytes,
) -> bool {
    match tx.try_send(BusMessage { topic, payload }) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            BridgeStats::incr(&stats.messages_dropped);
            tracing::warn!(topic=%message.topic, "ingest queue full; dropping message");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
