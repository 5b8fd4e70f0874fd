use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Humidity,
    AirQuality,
    EnergyUsage,
}

impl Quantity {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::AirQuality => "airQuality",
            Quantity::EnergyUsage => "energyUsage",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known value of every monitored quantity.
///
/// `last_persisted_at` is the moment of the last durable write attempt and is
/// what the dashboard receives as `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub air_quality: f64,
    pub energy_usage: f64,
    #[serde(rename = "timestamp")]
    pub last_persisted_at: DateTime<Utc>,
}

impl SensorSnapshot {
    pub fn new(energy_usage: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            air_quality: 0.0,
            energy_usage,
            last_persisted_at: started_at,
        }
    }

    fn set(&mut self, quantity: Quantity, value: f64) {
        match quantity {
            Quantity::Temperature => self.temperature = value,
            Quantity::Humidity => self.humidity = value,
            Quantity::AirQuality => self.air_quality = value,
            Quantity::EnergyUsage => self.energy_usage = value,
        }
    }
}

/// Shared handle to the live snapshot.
///
/// One lock guards the whole record: reads always see a complete copy, and
/// the throttle decision in [`SnapshotStore::claim_persist`] cannot interleave
/// with another claim. Updates to the same quantity are last-write-wins in
/// lock acquisition order; the bus worker applies them in delivery order, but
/// concurrent direct callers get no stronger ordering.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    inner: Arc<Mutex<SensorSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: SensorSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn update(&self, quantity: Quantity, value: f64) {
        self.inner.lock().set(quantity, value);
    }

    pub fn read(&self) -> SensorSnapshot {
        self.inner.lock().clone()
    }

    /// Advances `last_persisted_at` to `now` and returns the snapshot to write
    /// when at least `interval` has elapsed since the last attempt.
    pub fn claim_persist(&self, now: DateTime<Utc>, interval: Duration) -> Option<SensorSnapshot> {
        let mut snapshot = self.inner.lock();
        // A clock that went backwards reads as "not yet elapsed".
        match now.signed_duration_since(snapshot.last_persisted_at).to_std() {
            Ok(elapsed) if elapsed >= interval => {}
            _ => return None,
        }
        snapshot.last_persisted_at = now;
        Some(snapshot.clone())
    }
}
