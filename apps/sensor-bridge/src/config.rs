use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use rumqttc::QoS;
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_keepalive_secs: u64,
    pub command_qos: QoS,

    pub sensor_topic_prefix: String,
    pub device_topic_prefix: String,
    pub control_topic_prefix: String,

    pub http_bind: String,

    pub database_url: Option<String>,
    pub db_pool_size: u32,

    pub persist_interval_secs: u64,
    pub history_lookback_hours: u64,
    pub ingest_queue: usize,
    pub default_energy_usage: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let mqtt_url = env_string("BRIDGE_MQTT_URL", Some("mqtt://127.0.0.1:1883".to_string()))?;
        let (mqtt_host, mqtt_port) = parse_mqtt_url(&mqtt_url)?;
        let mqtt_username = env_optional("BRIDGE_MQTT_USERNAME");
        let mqtt_password = env_optional("BRIDGE_MQTT_PASSWORD");
        let mqtt_client_id = env_string(
            "BRIDGE_MQTT_CLIENT_ID",
            Some(format!("sensor-bridge-{}", std::process::id())),
        )?;
        let mqtt_keepalive_secs = env_u64("BRIDGE_MQTT_KEEPALIVE_SECS", Some(30))?;
        let command_qos = parse_qos(env_u64("BRIDGE_COMMAND_QOS", Some(0))?)?;

        let sensor_topic_prefix = topic_prefix("BRIDGE_SENSOR_TOPIC_PREFIX", "sensor")?;
        let device_topic_prefix = topic_prefix("BRIDGE_DEVICE_TOPIC_PREFIX", "device")?;
        let control_topic_prefix = topic_prefix("BRIDGE_CONTROL_TOPIC_PREFIX", "control")?;

        let http_bind = env_string("BRIDGE_HTTP_BIND", Some("0.0.0.0:5000".to_string()))?;

        let database_url =
            env_optional("BRIDGE_DATABASE_URL").or_else(|| env_optional("DATABASE_URL"));
        let db_pool_size = u32::try_from(env_u64("BRIDGE_DB_POOL_SIZE", Some(5))?)
            .context("BRIDGE_DB_POOL_SIZE out of range")?;

        let persist_interval_secs = env_u64("BRIDGE_PERSIST_INTERVAL_SECS", Some(60))?;
        let history_lookback_hours =
            lookback_hours(env_u64("BRIDGE_HISTORY_LOOKBACK_HOURS", Some(24))?)?;
        let ingest_queue = usize::try_from(env_u64("BRIDGE_INGEST_QUEUE", Some(1024))?.max(1))
            .context("BRIDGE_INGEST_QUEUE out of range")?;

        let default_energy_usage = match env_optional("BRIDGE_DEFAULT_ENERGY_USAGE") {
            Some(raw) => raw
                .parse::<f64>()
                .context("invalid BRIDGE_DEFAULT_ENERGY_USAGE")?,
            None => 51.0,
        };

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_keepalive_secs,
            command_qos,
            sensor_topic_prefix,
            device_topic_prefix,
            control_topic_prefix,
            http_bind,
            database_url,
            db_pool_size,
            persist_interval_secs,
            history_lookback_hours,
            ingest_queue,
            default_energy_usage,
        })
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    pub fn history_lookback(&self) -> Duration {
        Duration::from_secs(self.history_lookback_hours * 3600)
    }
}

/// Rejects windows that do not fit a `chrono::Duration`.
fn lookback_hours(hours: u64) -> Result<u64> {
    let fits = hours
        .checked_mul(3600)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(chrono::Duration::try_seconds)
        .is_some();
    if !fits {
        return Err(anyhow!("BRIDGE_HISTORY_LOOKBACK_HOURS {hours} is too large"));
    }
    Ok(hours)
}

fn parse_mqtt_url(raw: &str) -> Result<(String, u16)> {
    let url = Url::parse(raw).context("invalid BRIDGE_MQTT_URL")?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("BRIDGE_MQTT_URL missing host"))?
        .to_string();
    Ok((host, url.port().unwrap_or(1883)))
}

fn parse_qos(level: u64) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(anyhow!("invalid BRIDGE_COMMAND_QOS {other}; expected 0, 1 or 2")),
    }
}

fn topic_prefix(key: &str, default: &str) -> Result<String> {
    let value = env_string(key, Some(default.to_string()))?;
    let trimmed = value.trim_matches('/');
    if trimmed.is_empty() {
        return Err(anyhow!("{key} must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mqtt_url_defaults_port() {
        let (host, port) = parse_mqtt_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        let (_, port) = parse_mqtt_url("mqtt://10.0.0.2:8883").unwrap();
        assert_eq!(port, 8883);
    }

    #[test]
    fn mqtt_url_without_host_is_rejected() {
        assert!(parse_mqtt_url("not a url").is_err());
    }

    #[test]
    fn lookback_hours_must_fit_a_duration() {
        assert_eq!(lookback_hours(24).unwrap(), 24);
        assert_eq!(lookback_hours(0).unwrap(), 0);
        assert!(lookback_hours(u64::MAX / 1000).is_err());
        assert!(lookback_hours(u64::MAX).is_err());
    }

    #[test]
    fn qos_levels_map_to_rumqttc() {
        assert_eq!(parse_qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(parse_qos(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(parse_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(parse_qos(3).is_err());
    }
}
