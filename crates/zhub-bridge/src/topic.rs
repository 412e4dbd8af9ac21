//! Topic scheme
//!
//! Device traffic: `<prefix>/<IEEE>/<endpoint>/in/<Cluster>/<Command>[/<Attribute>]`
//! Commands:       `<prefix>/<IEEE>/<endpoint>/out/<Cluster>/<Command>`
//!
//! The IEEE address is 16 upper-case hex digits. Schema names become single
//! topic levels: `/` and the MQTT wildcards are replaced by `_`.

use crate::error::{BridgeError, Result};

/// Default first topic level
pub const DEFAULT_PREFIX: &str = "zhub";

pub fn format_ieee(ieee: u64) -> String {
    format!("{:016X}", ieee)
}

pub fn parse_ieee(text: &str) -> Option<u64> {
    if text.len() != 16 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(text, 16).ok()
}

/// A schema name made safe for use as one topic level
pub fn topic_level(name: &str) -> String {
    name.replace(&['/', '+', '#'][..], "_")
}

/// Topic for a decoded command, or one of its attributes
pub fn report_topic(
    prefix: &str,
    ieee: u64,
    endpoint: u8,
    cluster: &str,
    command: &str,
    attribute: Option<&str>,
) -> String {
    let mut topic = format!(
        "{}/{}/{}/in/{}/{}",
        prefix,
        format_ieee(ieee),
        endpoint,
        topic_level(cluster),
        topic_level(command)
    );
    if let Some(attribute) = attribute {
        topic.push('/');
        topic.push_str(&topic_level(attribute));
    }
    topic
}

/// Subscription filter matching every command topic
pub fn command_filter(prefix: &str) -> String {
    format!("{}/+/+/out/#", prefix)
}

/// A parsed command topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    pub ieee: u64,
    pub endpoint: u8,
    pub cluster: String,
    pub command: String,
}

impl CommandTopic {
    pub fn parse(prefix: &str, topic: &str) -> Result<Self> {
        let invalid = || BridgeError::InvalidTopic(topic.to_string());

        let rest = topic
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let levels: Vec<&str> = rest.split('/').collect();
        let [ieee, endpoint, "out", cluster, command] = levels.as_slice() else {
            return Err(invalid());
        };
        if cluster.is_empty() || command.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            ieee: parse_ieee(ieee).ok_or_else(invalid)?,
            endpoint: endpoint.parse().map_err(|_| invalid())?,
            cluster: cluster.to_string(),
            command: command.to_string(),
        })
    }
}
