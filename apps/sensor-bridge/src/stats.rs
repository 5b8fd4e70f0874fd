use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct BridgeStats {
    pub messages_received: AtomicU64,
    pub messages_malformed: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub readings_persisted: AtomicU64,
    pub persist_failures: AtomicU64,
    pub mqtt_connected: AtomicBool,
    pub last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub messages_dropped: u64,
    pub readings_persisted: u64,
    pub persist_failures: u64,
    pub mqtt_connected: bool,
    pub last_error: Option<String>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_malformed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            readings_persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn set_mqtt_connected(&self, connected: bool) {
        self.mqtt_connected.store(connected, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: impl Into<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(err.into());
        }
    }

    pub fn clear_error(&self) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = None;
        }
    }

    pub fn view(&self) -> StatsView {
        StatsView {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_malformed: self.messages_malformed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            readings_persisted: self.readings_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            mqtt_connected: self.mqtt_connected.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|guard| guard.clone()),
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}
