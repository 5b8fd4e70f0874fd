use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::topic::TopicLayout;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PublishError(pub String);

/// Outbound side of the bus. `Ok` means the local client accepted the
/// message; there is no broker acknowledgement beyond that.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &'static [u8]) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    LivingRoomLight,
    KitchenLight,
    BedroomLight,
    AirConditioner,
    RobotVacuum,
}

impl Device {
    pub const ALL: [Device; 5] = [
        Device::LivingRoomLight,
        Device::KitchenLight,
        Device::BedroomLight,
        Device::AirConditioner,
        Device::RobotVacuum,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|device| device.id() == id)
    }

    pub fn id(self) -> &'static str {
        match self {
            Device::LivingRoomLight => "livingRoomLight",
            Device::KitchenLight => "kitchenLight",
            Device::BedroomLight => "bedroomLight",
            Device::AirConditioner => "airConditioner",
            Device::RobotVacuum => "robotVacuum",
        }
    }

    /// Control topic below the control prefix.
    pub fn topic_suffix(self) -> &'static str {
        match self {
            Device::LivingRoomLight => "light/living",
            Device::KitchenLight => "light/kitchen",
            Device::BedroomLight => "light/bedroom",
            Device::AirConditioner => "ac",
            Device::RobotVacuum => "vacuum",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Device name is required")]
    MissingDevice,
    #[error("Unknown device")]
    UnknownDevice(String),
    #[error("Failed to send command")]
    PublishFailed(#[source] PublishError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub success: bool,
    pub device: String,
    pub state: bool,
}

#[derive(Clone)]
pub struct CommandRouter {
    publisher: Arc<dyn CommandPublisher>,
    layout: TopicLayout,
}

impl CommandRouter {
    pub fn new(publisher: Arc<dyn CommandPublisher>, layout: TopicLayout) -> Self {
        Self { publisher, layout }
    }

    pub async fn toggle(&self, device: &str, state: bool) -> Result<CommandAck, CommandError> {
        let id = device.trim();
        if id.is_empty() {
            return Err(CommandError::MissingDevice);
        }
        let Some(known) = Device::from_id(id) else {
            tracing::debug!(device = %id, "rejected command for unknown device");
            return Err(CommandError::UnknownDevice(id.to_string()));
        };

        let topic = self.layout.control_topic(known.topic_suffix());
        let payload: &'static [u8] = if state { b"1" } else { b"0" };
        if let Err(err) = self.publisher.publish(&topic, payload).await {
            tracing::error!(error=%err, topic=%topic, "failed to publish device command");
            return Err(CommandError::PublishFailed(err));
        }

        tracing::info!(topic=%topic, state, "published device command");
        Ok(CommandAck {
            success: true,
            device: known.id().to_string(),
            state,
        })
    }
}
