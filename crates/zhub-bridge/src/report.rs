//! Routing between AF messages and bus publications
//!
//! Incoming: an AF message addressed to the gateway endpoint is decoded as a
//! ZCL frame against the cluster schema and turned into one publication per
//! command, or one per attribute record for attribute reports.
//!
//! Outgoing: a command topic plus JSON payload is encoded into a ZCL frame
//! wrapped in an AF data request.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use zhub_core::xiaomi::{self, BASIC_CLUSTER, FF01_ATTRIBUTE};
use zhub_core::{
    AnyType, ClusterDb, ClusterInfo, CommandInfo, Context, DataType, FrameType, ObjectType,
    Value, ZclFrame, ZclHeader, REPORT_ATTRIBUTES,
};
use zhub_transport::af::DEFAULT_RADIUS;
use zhub_transport::{DataRequest, IncomingMsg};

use crate::error::{BridgeError, Result};
use crate::topic::{report_topic, topic_level, CommandTopic};
use crate::traits::{MessageBus, QoS};

/// One message for the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: String,
    pub payload: Value,
}

/// Schema lookups plus the per-device state of the gateway endpoint
pub struct ReportHandler {
    db: Arc<ClusterDb>,
    prefix: String,
    endpoint: u8,
    last_message: Mutex<HashMap<u16, Bytes>>,
    sequence: Mutex<HashMap<u16, u8>>,
}

impl ReportHandler {
    pub fn new(db: Arc<ClusterDb>, prefix: impl Into<String>, endpoint: u8) -> Self {
        Self {
            db,
            prefix: prefix.into(),
            endpoint,
            last_message: Mutex::new(HashMap::new()),
            sequence: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &ClusterDb {
        &self.db
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Whether a message should be processed at all
    ///
    /// Rejects messages for other endpoints and repeats of the previous
    /// message from the same device (radio-level retries).
    pub fn accept(&self, msg: &IncomingMsg) -> bool {
        if msg.dst_endpoint != self.endpoint {
            return false;
        }
        let mut last = self.last_message.lock();
        if last.get(&msg.src_addr) == Some(&msg.data) {
            debug!("Ignoring duplicate message from 0x{:04x}", msg.src_addr);
            return false;
        }
        last.insert(msg.src_addr, msg.data.clone());
        true
    }

    /// Decode a message into the publications it produces
    pub fn publications(&self, ieee: u64, msg: &IncomingMsg) -> Result<Vec<Publication>> {
        let frame = ZclFrame::decode(&msg.data)?;
        let cluster = self
            .db
            .cluster_by_id(msg.cluster_id)
            .ok_or(BridgeError::UnknownCluster(msg.cluster_id))?;
        let command_id = frame.header.command_id;
        let command = match frame.header.frame_type {
            FrameType::Global => self.db.global_command_by_id(command_id),
            FrameType::ClusterSpecific => cluster.command_in_by_id(command_id),
        }
        .ok_or(BridgeError::UnknownCommand {
            cluster: cluster.id,
            command: command_id,
        })?;

        let ctx = Context::with_cluster(cluster);
        let decoded = command.decode_payload(&ctx, &frame.payload)?;
        debug!(
            "0x{:04x}/{} {}: {}",
            msg.src_addr, msg.src_endpoint, command.name, decoded
        );

        let topic = |attribute: Option<&str>| {
            report_topic(
                &self.prefix,
                ieee,
                msg.src_endpoint,
                &cluster.name,
                &command.name,
                attribute,
            )
        };

        let is_report =
            frame.header.frame_type == FrameType::Global && command_id == REPORT_ATTRIBUTES;
        let Some(records) = is_report.then(|| attribute_records(command, &decoded)).flatten()
        else {
            return Ok(vec![Publication {
                topic: topic(None),
                payload: decoded,
            }]);
        };

        Ok(records
            .into_iter()
            .map(|(attribute, value)| {
                let level = attribute_level(attribute);
                let payload = expand_ff01(cluster, attribute, value);
                Publication {
                    topic: topic(Some(&level)),
                    payload,
                }
            })
            .collect())
    }

    /// Decode a message and publish the result on `bus`
    ///
    /// Returns the number of publications.
    pub async fn forward(
        &self,
        bus: &dyn MessageBus,
        qos: QoS,
        ieee: u64,
        msg: &IncomingMsg,
    ) -> Result<usize> {
        let publications = self.publications(ieee, msg)?;
        for publication in &publications {
            bus.publish(&publication.topic, &publication.payload, qos, false)
                .await?;
        }
        Ok(publications.len())
    }

    /// Transaction sequence number for the next frame to `nwk_addr`
    pub fn next_sequence(&self, nwk_addr: u16) -> u8 {
        let mut sequence = self.sequence.lock();
        let counter = sequence.entry(nwk_addr).or_insert(0);
        let current = *counter;
        *counter = counter.wrapping_add(1);
        current
    }

    /// Build the AF request for a command received on `topic`
    ///
    /// An empty payload stands for a command without arguments.
    pub fn command_request(
        &self,
        topic: &CommandTopic,
        payload: &[u8],
        nwk_addr: u16,
    ) -> Result<DataRequest> {
        let cluster = self
            .resolve_cluster(&topic.cluster)
            .ok_or_else(|| BridgeError::UnknownClusterName(topic.cluster.clone()))?;
        let (is_global, command) = self.resolve_command(cluster, &topic.command).ok_or_else(|| {
            BridgeError::UnknownCommandName {
                cluster: cluster.name.clone(),
                command: topic.command.clone(),
            }
        })?;

        let value = if payload.iter().all(u8::is_ascii_whitespace) {
            Value::Map(Default::default())
        } else {
            serde_json::from_slice(payload)
                .map_err(|e| BridgeError::InvalidPayload(e.to_string()))?
        };

        let ctx = Context::with_cluster(cluster);
        let encoded = command.encode_payload(&ctx, &value)?;
        let frame_type = if is_global {
            FrameType::Global
        } else {
            FrameType::ClusterSpecific
        };
        let sequence = self.next_sequence(nwk_addr);
        let frame = ZclFrame::new(ZclHeader::new(frame_type, sequence, command.id), encoded);

        debug!(
            "{} {} -> 0x{:04x}/{} (tsn {})",
            cluster.name, command.name, nwk_addr, topic.endpoint, sequence
        );

        Ok(DataRequest {
            dst_addr: nwk_addr,
            dst_endpoint: topic.endpoint,
            src_endpoint: self.endpoint,
            cluster_id: cluster.id,
            trans_id: sequence,
            options: 0,
            radius: DEFAULT_RADIUS,
            data: frame.encode(),
        })
    }

    /// Cluster by schema name, topic-level name, or numeric id
    fn resolve_cluster(&self, level: &str) -> Option<&ClusterInfo> {
        self.db
            .cluster_by_name(level)
            .or_else(|| parse_id(level).and_then(|id| self.db.cluster_by_id(id)))
            .or_else(|| self.db.clusters().find(|c| topic_level(&c.name) == level))
    }

    fn resolve_command<'a>(
        &'a self,
        cluster: &'a ClusterInfo,
        level: &str,
    ) -> Option<(bool, &'a CommandInfo)> {
        self.db.command_out_by_name(cluster.id, level).or_else(|| {
            let matches = |c: &&CommandInfo| topic_level(&c.name) == level;
            self.db
                .global_commands()
                .find(matches)
                .map(|c| (true, c))
                .or_else(|| cluster.commands_out.iter().find(matches).map(|c| (false, c)))
        })
    }
}

fn parse_id(text: &str) -> Option<u16> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// The `(attribute, value)` pairs of a decoded attribute report
///
/// The record list is the payload's repeated object; within a record, the
/// `attribId` property names the attribute and the variant carries the value.
fn attribute_records<'v>(
    command: &CommandInfo,
    decoded: &'v Value,
) -> Option<Vec<(&'v Value, &'v Value)>> {
    let (list_name, record) = command.payload.properties.iter().find_map(|entry| {
        match &entry.ty {
            AnyType::GreedyRepeated(inner) => match inner.as_ref() {
                AnyType::Object(record) => Some((entry.name.as_str(), record)),
                _ => None,
            },
            _ => None,
        }
    })?;
    let attribute_key = property_of(record, |ty| *ty == AnyType::DataType(DataType::AttribId))?;
    let value_key = property_of(record, |ty| *ty == AnyType::Variant)?;

    let records = decoded.get(list_name)?.as_array()?;
    Some(
        records
            .iter()
            .filter_map(|r| Some((r.get(attribute_key)?, r.get(value_key)?)))
            .collect(),
    )
}

fn property_of(object: &ObjectType, pred: impl Fn(&AnyType) -> bool) -> Option<&str> {
    object
        .properties
        .iter()
        .find(|entry| pred(&entry.ty))
        .map(|entry| entry.name.as_str())
}

/// Topic level for a decoded attribute id: its name, or `0x%04X`
fn attribute_level(attribute: &Value) -> String {
    match attribute {
        Value::String(name) => name.clone(),
        other => match other.as_u64() {
            Some(id) => format!("0x{:04X}", id),
            None => other.to_string(),
        },
    }
}

/// Replace the raw Xiaomi heartbeat string by its decoded form
fn expand_ff01(cluster: &ClusterInfo, attribute: &Value, value: &Value) -> Value {
    let id = match attribute {
        Value::String(name) => cluster.attribute_by_name(name).map(|a| a.id),
        other => other.as_u64().and_then(|id| u16::try_from(id).ok()),
    };
    if cluster.id != BASIC_CLUSTER || id != Some(FF01_ATTRIBUTE) {
        return value.clone();
    }

    let Some(bytes) = value.get("value").and_then(xiaomi::ff01_bytes) else {
        return value.clone();
    };
    match xiaomi::decode_ff01(&bytes) {
        Ok(expanded) => Value::variant("xiaomi_ff01", expanded),
        Err(e) => {
            warn!("Cannot decode FF01 attribute: {}", e);
            value.clone()
        }
    }
}
