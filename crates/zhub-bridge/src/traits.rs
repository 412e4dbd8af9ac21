//! Message bus abstraction

use async_trait::async_trait;
use zhub_core::Value;

use crate::Result;

/// Delivery guarantee requested for a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    /// Map an MQTT QoS level; anything above 2 is clamped
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }
}

/// Events from a running bus
#[derive(Debug, Clone)]
pub enum BusEvent {
    Connected,
    Disconnected { reason: Option<String> },
    /// Message on one of the command topics
    Command { topic: String, payload: Vec<u8> },
    Error(String),
}

/// Where decoded device traffic is published
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` serialized as JSON
    async fn publish(&self, topic: &str, payload: &Value, qos: QoS, retain: bool) -> Result<()>;
}
