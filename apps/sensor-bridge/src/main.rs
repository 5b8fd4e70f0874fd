use anyhow::Result;
use sensor_bridge::clock;
use sensor_bridge::command::CommandRouter;
use sensor_bridge::config::Config;
use sensor_bridge::gate::PersistenceGate;
use sensor_bridge::history::{
    build_pool, HistoryRepository, MemoryHistoryRepository, PgHistoryRepository,
};
use sensor_bridge::http;
use sensor_bridge::ingest::{spawn_ingest_worker, BusMessage, IngestionService};
use sensor_bridge::mqtt::MqttBus;
use sensor_bridge::snapshot::{SensorSnapshot, SnapshotStore};
use sensor_bridge::stats::BridgeStats;
use sensor_bridge::topic::TopicLayout;
use std::sync::Arc;
use tokio::sync::mpsc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensor_bridge=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

async fn build_history(config: &Config) -> Result<Arc<dyn HistoryRepository>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("no database configured; history kept in memory only");
        return Ok(Arc::new(MemoryHistoryRepository::new()));
    };
    let pool = build_pool(database_url, config.db_pool_size).await?;
    let repo = PgHistoryRepository::new(pool);
    repo.ensure_schema().await?;
    tracing::info!("connected to history database");
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let layout = TopicLayout::from_config(&config);
    let stats = Arc::new(BridgeStats::new());
    let clock = clock::system();
    let snapshot = SnapshotStore::new(SensorSnapshot::new(
        config.default_energy_usage,
        clock.now(),
    ));
    let history = build_history(&config).await?;

    let gate = PersistenceGate::new(
        snapshot.clone(),
        history.clone(),
        clock,
        config.persist_interval(),
        stats.clone(),
    );
    let ingestor = IngestionService::new(layout.clone(), snapshot.clone(), gate, stats.clone());

    let (tx, rx) = mpsc::channel::<BusMessage>(config.ingest_queue);
    let worker_handle = spawn_ingest_worker(rx, ingestor);
    let (bus, mqtt_handle) = MqttBus::start(&config, &layout, tx, stats.clone());

    let app = http::router(http::HttpState {
        snapshot,
        history,
        commands: CommandRouter::new(Arc::new(bus), layout),
        stats,
        history_lookback: config.history_lookback(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(bind=%config.http_bind, "sensor-bridge HTTP listening");
    let http_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error=%err, "HTTP server exited");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        res = mqtt_handle => {
            if let Err(err) = res { tracing::error!(error=%err, "MQTT task failed"); }
        }
        res = worker_handle => {
            if let Err(err) = res { tracing::error!(error=%err, "ingest worker failed"); }
        }
        res = http_handle => {
            if let Err(err) = res { tracing::error!(error=%err, "HTTP task failed"); }
        }
    }

    Ok(())
}
