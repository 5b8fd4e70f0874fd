use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::history::{HistoryRepository, SensorReading};
use crate::snapshot::SnapshotStore;
use crate::stats::BridgeStats;

/// Throttled writer of snapshot samples into history.
///
/// The throttle timer is advanced before the write and stays advanced when
/// the write fails: a failing store loses that sample and is not retried
/// until a full interval later. Writes run on their own task so a slow store
/// never holds up snapshot updates.
#[derive(Clone)]
pub struct PersistenceGate {
    snapshot: SnapshotStore,
    history: Arc<dyn HistoryRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stats: Arc<BridgeStats>,
}

impl PersistenceGate {
    pub fn new(
        snapshot: SnapshotStore,
        history: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            snapshot,
            history,
            clock,
            interval,
            stats,
        }
    }

    /// Claims the current throttle window and starts the write in the
    /// background. Returns `None` when the window is not yet open; otherwise
    /// the handle resolves to whether the store accepted the reading.
    pub fn maybe_persist(&self) -> Option<JoinHandle<bool>> {
        let now = self.clock.now();
        let snapshot = self.snapshot.claim_persist(now, self.interval)?;
        let reading = SensorReading::sample(&snapshot, now);
        let history = self.history.clone();
        let stats = self.stats.clone();
        Some(tokio::spawn(async move {
            write_reading(history.as_ref(), &stats, &reading).await
        }))
    }
}

async fn write_reading(
    history: &dyn HistoryRepository,
    stats: &BridgeStats,
    reading: &SensorReading,
) -> bool {
    match history.append(reading).await {
        Ok(()) => {
            BridgeStats::incr(&stats.readings_persisted);
            stats.clear_error();
            tracing::info!(
                temperature = reading.temperature,
                humidity = reading.humidity,
                air_quality = reading.air_quality,
                "saved sensor reading"
            );
            true
        }
        Err(err) => {
            BridgeStats::incr(&stats.persist_failures);
            stats.record_error(err.to_string());
            tracing::warn!(error=%err, "failed to persist sensor reading; sample dropped");
            false
        }
    }
}
