//! Link abstraction under the ZNP framing layer

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events reported by a byte link
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Raw bytes read from the link, not aligned to frame boundaries
    Data(Bytes),
    /// Link closed, with the I/O error if there was one
    Disconnected { reason: Option<String> },
    /// Non-fatal link error
    Error(String),
}

/// Write half of a byte link
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Write all of `data`
    async fn send(&self, data: Bytes) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<()>;
}

/// Read half of a byte link
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event, `None` once the link is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}
