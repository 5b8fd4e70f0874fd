//! Topic layout of the home bus and the pure classification of inbound topics.

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    Temperature,
    Humidity,
    AirQuality,
    DeviceStatus(String),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    pub sensor_prefix: String,
    pub device_prefix: String,
    pub control_prefix: String,
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self {
            sensor_prefix: "sensor".to_string(),
            device_prefix: "device".to_string(),
            control_prefix: "control".to_string(),
        }
    }
}

impl TopicLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sensor_prefix: config.sensor_topic_prefix.clone(),
            device_prefix: config.device_topic_prefix.clone(),
            control_prefix: config.control_topic_prefix.clone(),
        }
    }

    pub fn temperature(&self) -> String {
        format!("{}/temperature", self.sensor_prefix)
    }

    pub fn humidity(&self) -> String {
        format!("{}/humidity", self.sensor_prefix)
    }

    pub fn air_quality(&self) -> String {
        format!("{}/airquality", self.sensor_prefix)
    }

    pub fn device_filter(&self) -> String {
        format!("{}/#", self.device_prefix)
    }

    /// Every filter the bridge subscribes to.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.temperature(),
            self.humidity(),
            self.air_quality(),
            self.device_filter(),
        ]
    }

    pub fn control_topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.control_prefix, suffix)
    }

    pub fn classify(&self, topic: &str) -> TopicKind {
        classify_topic(self, topic)
    }
}

pub fn classify_topic(layout: &TopicLayout, topic: &str) -> TopicKind {
    if let Some(quantity) = topic
        .strip_prefix(layout.sensor_prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    {
        match quantity {
            "temperature" => return TopicKind::Temperature,
            "humidity" => return TopicKind::Humidity,
            "airquality" => return TopicKind::AirQuality,
            _ => {}
        }
    }

    if let Some(rest) = topic
        .strip_prefix(layout.device_prefix.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    {
        // Nested device topics report under their last segment.
        let name = rest.rsplit('/').next().unwrap_or("");
        if !name.is_empty() {
            return TopicKind::DeviceStatus(name.to_string());
        }
    }

    TopicKind::Unrecognized
}
