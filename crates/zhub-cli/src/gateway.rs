//! Gateway run loop
//!
//! Starts the coordinator, then shuttles AF messages to the bus and bus
//! commands to the coordinator until shutdown or until either side goes away.

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use zhub_bridge::topic::format_ieee;
use zhub_bridge::{BusEvent, CommandTopic, MqttBus, ReportHandler};
use zhub_core::ClusterDb;
use zhub_transport::af::{AF_INCOMING_MSG, HA_PROFILE, MAX_REGISTERED_CLUSTERS};
use zhub_transport::{
    AfRegister, CommandType, IncomingMsg, SerialTransport, Subsystem, ZnpClient, ZnpFrame,
};

use crate::config::Config;

/// Device id announced for the gateway endpoint (configuration tool)
const GATEWAY_DEVICE_ID: u16 = 0x0005;

/// Delay passed to ZDO_STARTUP_FROM_APP
const STARTUP_DELAY_MS: u16 = 100;

/// Short and IEEE addresses learned from the coordinator
#[derive(Debug, Default)]
pub struct AddressBook {
    by_nwk: HashMap<u16, u64>,
    by_ieee: HashMap<u64, u16>,
}

impl AddressBook {
    /// Record a pair, forgetting stale entries for either address
    pub fn insert(&mut self, nwk: u16, ieee: u64) {
        if let Some(old_ieee) = self.by_nwk.insert(nwk, ieee) {
            if old_ieee != ieee {
                self.by_ieee.remove(&old_ieee);
            }
        }
        if let Some(old_nwk) = self.by_ieee.insert(ieee, nwk) {
            if old_nwk != nwk {
                self.by_nwk.remove(&old_nwk);
            }
        }
    }

    pub fn ieee(&self, nwk: u16) -> Option<u64> {
        self.by_nwk.get(&nwk).copied()
    }

    pub fn nwk(&self, ieee: u64) -> Option<u16> {
        self.by_ieee.get(&ieee).copied()
    }
}

pub struct Gateway {
    client: ZnpClient,
    bus: MqttBus,
    handler: ReportHandler,
    addresses: Mutex<AddressBook>,
}

impl Gateway {
    pub fn new(client: ZnpClient, bus: MqttBus, handler: ReportHandler) -> Self {
        Self {
            client,
            bus,
            handler,
            addresses: Mutex::new(AddressBook::default()),
        }
    }

    /// Bring the network up and register the gateway endpoint
    pub async fn start_coordinator(&self) -> Result<()> {
        let capabilities = self.client.ping().await.context("Coordinator did not answer ping")?;
        info!("Coordinator capabilities: 0x{:04x}", capabilities);

        match self.client.startup_from_app(STARTUP_DELAY_MS).await? {
            0 => info!("Restored existing network"),
            1 => info!("Started new network"),
            status => bail!("Network did not start (status {})", status),
        }

        let mut clusters: Vec<u16> = self.handler.db().clusters().map(|c| c.id).collect();
        if clusters.len() > MAX_REGISTERED_CLUSTERS {
            warn!(
                "Registering only the first {} of {} clusters",
                MAX_REGISTERED_CLUSTERS,
                clusters.len()
            );
            clusters.truncate(MAX_REGISTERED_CLUSTERS);
        }
        let register = AfRegister {
            endpoint: self.handler.endpoint(),
            profile_id: HA_PROFILE,
            device_id: GATEWAY_DEVICE_ID,
            device_version: 0,
            latency: 0,
            input_clusters: clusters.clone(),
            output_clusters: clusters,
        };
        self.client.af_register(&register).await?;
        info!("Registered endpoint {}", register.endpoint);
        Ok(())
    }

    async fn resolve_ieee(&self, nwk: u16) -> Result<u64> {
        let cached = self.addresses.lock().ieee(nwk);
        if let Some(ieee) = cached {
            return Ok(ieee);
        }
        let ieee = self
            .client
            .nwk_addr_lookup(nwk)
            .await
            .with_context(|| format!("IEEE lookup for 0x{:04x} failed", nwk))?;
        debug!("0x{:04x} is {}", nwk, format_ieee(ieee));
        self.addresses.lock().insert(nwk, ieee);
        Ok(ieee)
    }

    async fn on_frame(&self, frame: ZnpFrame) -> Result<()> {
        if frame.key() != (CommandType::Areq, Subsystem::Af, AF_INCOMING_MSG) {
            return Ok(());
        }
        let msg = IncomingMsg::decode(&frame.payload)?;
        if !self.handler.accept(&msg) {
            return Ok(());
        }
        let ieee = self.resolve_ieee(msg.src_addr).await?;
        let count = self
            .handler
            .forward(&self.bus, self.bus.qos(), ieee, &msg)
            .await
            .with_context(|| {
                format!(
                    "Dropping message from 0x{:04x} on cluster 0x{:04x}",
                    msg.src_addr, msg.cluster_id
                )
            })?;
        debug!("Published {} messages for 0x{:04x}", count, msg.src_addr);
        Ok(())
    }

    async fn on_command(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let command = CommandTopic::parse(&self.bus.config().topic_prefix, topic)?;
        let nwk = self
            .addresses
            .lock()
            .nwk(command.ieee)
            .ok_or_else(|| anyhow!("device {} has not been seen yet", format_ieee(command.ieee)))?;
        let request = self.handler.command_request(&command, payload, nwk)?;
        self.client.af_data_request(&request).await?;
        info!("{} {} sent to {}", command.cluster, command.command, format_ieee(command.ieee));
        Ok(())
    }

    /// Process traffic until shutdown
    pub async fn run(
        &self,
        mut link_closed: impl std::future::Future<Output = ()> + Unpin,
        shutdown: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        let mut frames = self.client.subscribe();
        let mut bus_events = self.bus.start().await?;

        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        if let Err(e) = self.on_frame(frame).await {
                            warn!("{:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Fell behind, {} frames dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = bus_events.recv() => match event {
                    Some(BusEvent::Command { topic, payload }) => {
                        if let Err(e) = self.on_command(&topic, &payload).await {
                            warn!("Command on {} failed: {:#}", topic, e);
                        }
                    }
                    Some(BusEvent::Connected) => info!("Bus connected"),
                    Some(BusEvent::Disconnected { reason }) => warn!("Bus disconnected: {:?}", reason),
                    Some(BusEvent::Error(e)) => debug!("Bus error: {}", e),
                    None => bail!("MQTT event loop stopped"),
                },
                _ = &mut link_closed => bail!("Coordinator link closed"),
                _ = shutdown.recv() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        self.bus.stop().await?;
        self.client.close().await?;
        Ok(())
    }
}

/// Open the serial link and run the gateway
pub async fn run(config: Config, db: ClusterDb, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
    let (sender, receiver) =
        SerialTransport::connect_with_config(&config.serial.port, config.serial.link_config())
            .await
            .with_context(|| format!("Failed to open {}", config.serial.port))?;

    let client = ZnpClient::new(Arc::new(sender))
        .with_timeout(Duration::from_millis(config.zigbee.request_timeout_ms));
    let reader = client.clone();
    let mut reader_task = tokio::spawn(async move { reader.run_reader(receiver).await });

    let handler = ReportHandler::new(
        Arc::new(db),
        config.mqtt.topic_prefix.clone(),
        config.zigbee.endpoint,
    );
    let gateway = Gateway::new(client, MqttBus::new(config.mqtt.clone()), handler);

    let result = async {
        gateway.start_coordinator().await?;
        let link_closed = async {
            let _ = (&mut reader_task).await;
        };
        tokio::pin!(link_closed);
        gateway.run(link_closed, shutdown).await
    }
    .await;

    reader_task.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_book() {
        let mut book = AddressBook::default();
        book.insert(0x1234, 0xaa);
        assert_eq!(book.ieee(0x1234), Some(0xaa));
        assert_eq!(book.nwk(0xaa), Some(0x1234));

        // device rejoined with a new short address
        book.insert(0x5678, 0xaa);
        assert_eq!(book.ieee(0x1234), None);
        assert_eq!(book.nwk(0xaa), Some(0x5678));

        // short address reused by another device
        book.insert(0x5678, 0xbb);
        assert_eq!(book.nwk(0xaa), None);
        assert_eq!(book.ieee(0x5678), Some(0xbb));
    }
}
