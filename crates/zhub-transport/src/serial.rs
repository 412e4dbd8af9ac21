//! Serial link to the coordinator
//!
//! The port is split into read and write halves: a reader task forwards
//! raw chunks as [`TransportEvent::Data`], the sender writes whole frames.

#[cfg(feature = "serial")]
use async_trait::async_trait;
#[cfg(feature = "serial")]
use bytes::Bytes;
#[cfg(feature = "serial")]
use parking_lot::Mutex;
#[cfg(feature = "serial")]
use std::sync::Arc;
#[cfg(feature = "serial")]
use tokio::sync::mpsc;
#[cfg(feature = "serial")]
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
#[cfg(feature = "serial")]
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Serial link configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// RTS/CTS hardware flow control (default: off)
    pub rtscts: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            rtscts: false,
        }
    }
}

#[cfg(feature = "serial")]
pub struct SerialTransport;

#[cfg(feature = "serial")]
impl SerialTransport {
    /// List available serial ports
    pub fn list_ports() -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports().map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to list ports: {}", e))
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    pub async fn connect(port_name: &str) -> Result<(SerialSender, SerialReceiver)> {
        Self::connect_with_config(port_name, SerialConfig::default()).await
    }

    pub async fn connect_with_config(
        port_name: &str,
        config: SerialConfig,
    ) -> Result<(SerialSender, SerialReceiver)> {
        use tokio_serial::{FlowControl, SerialPortBuilderExt};

        let flow_control = if config.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        let port = tokio_serial::new(port_name, config.baud_rate)
            .flow_control(flow_control)
            .open_native_async()
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to open {}: {}", port_name, e)))?;

        info!(
            "Serial port opened: {} @ {} baud (rtscts: {})",
            port_name, config.baud_rate, config.rtscts
        );

        let (mut reader, writer) = tokio::io::split(port);
        let (tx, rx) = mpsc::channel(100);
        let connected = Arc::new(Mutex::new(true));
        let connected_clone = Arc::clone(&connected);

        tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = vec![0u8; 1024];

            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        *connected_clone.lock() = false;
                        let _ = tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buf[..n]);
                        if tx.send(TransportEvent::Data(data)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Serial read error: {}", e);
                        *connected_clone.lock() = false;
                        let _ = tx
                            .send(TransportEvent::Disconnected {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        let sender = SerialSender {
            writer: tokio::sync::Mutex::new(writer),
            connected,
        };
        Ok((sender, SerialReceiver { rx }))
    }
}

/// Write half of the serial link
#[cfg(feature = "serial")]
pub struct SerialSender {
    writer: tokio::sync::Mutex<tokio::io::WriteHalf<tokio_serial::SerialStream>>,
    connected: Arc<Mutex<bool>>,
}

#[cfg(feature = "serial")]
#[async_trait]
impl TransportSender for SerialSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&data)
            .await
            .map_err(|e| TransportError::SendFailed(format!("Serial write failed: {}", e)))?;
        writer.flush().await?;

        debug!("Serial sent {} bytes", data.len());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// Read half of the serial link
#[cfg(feature = "serial")]
pub struct SerialReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[cfg(feature = "serial")]
#[async_trait]
impl TransportReceiver for SerialReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

// Stubs when the serial feature is disabled
#[cfg(not(feature = "serial"))]
pub struct SerialTransport;

#[cfg(not(feature = "serial"))]
impl SerialTransport {
    pub fn list_ports() -> Result<Vec<String>> {
        Err(TransportError::ConnectionFailed(
            "Serial feature not enabled. Compile with --features serial".into(),
        ))
    }

    pub async fn connect_with_config(
        _port_name: &str,
        _config: SerialConfig,
    ) -> Result<(SerialSender, SerialReceiver)> {
        Err(TransportError::ConnectionFailed(
            "Serial feature not enabled. Compile with --features serial".into(),
        ))
    }
}

#[cfg(not(feature = "serial"))]
pub struct SerialSender;

#[cfg(not(feature = "serial"))]
pub struct SerialReceiver;
