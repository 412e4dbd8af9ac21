//! zhub message bus bridge
//!
//! Connects the ZCL codec to a publish/subscribe bus:
//! - [`MessageBus`] abstraction and its MQTT implementation
//! - Topic scheme for device traffic and commands
//! - [`ReportHandler`] turning AF messages into publications and command
//!   topics into AF data requests

pub mod error;
pub mod report;
pub mod topic;
pub mod traits;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use error::{BridgeError, Result};
pub use report::{Publication, ReportHandler};
pub use topic::CommandTopic;
pub use traits::{BusEvent, MessageBus, QoS};

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBus, MqttConfig, MqttUrl};
