use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::gate::PersistenceGate;
use crate::snapshot::{Quantity, SnapshotStore};
use crate::stats::BridgeStats;
use crate::topic::{TopicKind, TopicLayout};

#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// `persist_started` is true when this update opened a throttle window
    /// and a history write was started in the background.
    Updated {
        quantity: Quantity,
        value: f64,
        persist_started: bool,
    },
    DeviceStatus {
        device: String,
    },
    Malformed,
    Ignored,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload is empty")]
    Empty,
    #[error("payload {0:?} is not a finite decimal number")]
    NotANumber(String),
}

/// Strict decimal parse of a sensor payload.
pub fn parse_reading(payload: &[u8]) -> Result<f64, PayloadError> {
    let text = std::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(PayloadError::Empty);
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PayloadError::NotANumber(text.to_string())),
    }
}

#[derive(Clone)]
pub struct IngestionService {
    layout: TopicLayout,
    snapshot: SnapshotStore,
    gate: PersistenceGate,
    stats: Arc<BridgeStats>,
}

impl IngestionService {
    pub fn new(
        layout: TopicLayout,
        snapshot: SnapshotStore,
        gate: PersistenceGate,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            layout,
            snapshot,
            gate,
            stats,
        }
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// Applies one bus message. Never fails: bad input is logged and dropped.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) -> MessageOutcome {
        BridgeStats::incr(&self.stats.messages_received);

        let quantity = match self.layout.classify(topic) {
            TopicKind::Temperature => Quantity::Temperature,
            TopicKind::Humidity => Quantity::Humidity,
            TopicKind::AirQuality => Quantity::AirQuality,
            TopicKind::DeviceStatus(device) => {
                let status = String::from_utf8_lossy(payload);
                tracing::info!(device=%device, status=%status.trim(), "device status");
                return MessageOutcome::DeviceStatus { device };
            }
            TopicKind::Unrecognized => {
                tracing::debug!(topic=%topic, "ignoring message on unrecognized topic");
                return MessageOutcome::Ignored;
            }
        };

        let value = match parse_reading(payload) {
            Ok(value) => value,
            Err(err) => {
                BridgeStats::incr(&self.stats.messages_malformed);
                tracing::warn!(error=%err, topic=%topic, "discarding malformed sensor payload");
                return MessageOutcome::Malformed;
            }
        };

        tracing::debug!(topic=%topic, quantity=%quantity, value, "sensor update");
        self.snapshot.update(quantity, value);
        let persist_started = self.gate.maybe_persist().is_some();

        MessageOutcome::Updated {
            quantity,
            value,
            persist_started,
        }
    }
}

/// Drains the bus channel into `service` one message at a time until every
/// sender is gone.
pub fn spawn_ingest_worker(
    mut rx: mpsc::Receiver<BusMessage>,
    service: IngestionService,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            service.on_message(&message.topic, &message.payload).await;
        }
        tracing::info!("ingest channel closed; worker exiting");
    })
}
