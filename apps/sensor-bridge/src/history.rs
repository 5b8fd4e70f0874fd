use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;

use crate::snapshot::SensorSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub temperature: f64,
    pub humidity: f64,
    pub air_quality: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Sample of `snapshot` stamped with the write time.
    pub fn sample(snapshot: &SensorSnapshot, timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature: snapshot.temperature,
            humidity: snapshot.humidity,
            air_quality: snapshot.air_quality,
            timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<sqlx::Error> for HistoryError {
    fn from(err: sqlx::Error) -> Self {
        HistoryError::StoreUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, reading: &SensorReading) -> Result<(), HistoryError>;

    /// Readings with `from <= timestamp <= to`, oldest first.
    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, HistoryError>;
}

pub async fn build_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgHistoryRepository {
    pool: PgPool,
}

impl PgHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_readings (
                id bigserial primary key,
                temperature double precision not null,
                humidity double precision not null,
                air_quality double precision not null,
                timestamp timestamptz not null default now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS sensor_readings_timestamp_idx ON sensor_readings (timestamp)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    async fn append(&self, reading: &SensorReading) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (temperature, humidity, air_quality, timestamp)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.air_quality)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, HistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT temperature, humidity, air_quality, timestamp
            FROM sensor_readings
            WHERE timestamp >= $1 AND timestamp <= $2
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut readings = Vec::with_capacity(rows.len());
        for row in rows {
            readings.push(SensorReading {
                temperature: row.try_get("temperature")?,
                humidity: row.try_get("humidity")?,
                air_quality: row.try_get("air_quality")?,
                timestamp: row.try_get("timestamp")?,
            });
        }
        Ok(readings)
    }
}

/// Process-local history used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryHistoryRepository {
    readings: Mutex<Vec<SensorReading>>,
}

impl MemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.readings.lock().await.len()
    }

    pub async fn all(&self) -> Vec<SensorReading> {
        self.readings.lock().await.clone()
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn append(&self, reading: &SensorReading) -> Result<(), HistoryError> {
        self.readings.lock().await.push(reading.clone());
        Ok(())
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, HistoryError> {
        let mut out: Vec<SensorReading> = self
            .readings
            .lock()
            .await
            .iter()
            .filter(|reading| reading.timestamp >= from && reading.timestamp <= to)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by_key(|reading| reading.timestamp);
        Ok(out)
    }
}
