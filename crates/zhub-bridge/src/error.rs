//! Bridge error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid MQTT URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid topic '{0}'")]
    InvalidTopic(String),

    #[error("unknown cluster 0x{0:04x}")]
    UnknownCluster(u16),

    #[error("unknown cluster '{0}'")]
    UnknownClusterName(String),

    #[error("unknown command 0x{command:02x} for cluster 0x{cluster:04x}")]
    UnknownCommand { cluster: u16, command: u8 },

    #[error("unknown command '{command}' for cluster '{cluster}'")]
    UnknownCommandName { cluster: String, command: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Codec(#[from] zhub_core::Error),

    #[error(transparent)]
    Transport(#[from] zhub_transport::TransportError),

    #[error("bridge error: {0}")]
    Other(String),
}
