//! Offline schema tools: `decode` and `check-schema`

use anyhow::{anyhow, bail, Context as _, Result};
use std::path::Path;
use zhub_core::{ClusterDb, ClusterInfo, CommandInfo, Context, Value};

pub fn load_schema(path: &Path) -> Result<ClusterDb> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema {}", path.display()))?;
    ClusterDb::load(&text).with_context(|| format!("Invalid schema {}", path.display()))
}

/// Hex bytes, optionally `0x`-prefixed and separated by spaces, `:` or `-`
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-'))
        .collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        bail!("invalid hex digit '{}' in '{}'", bad, text);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in '{}'", text);
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| anyhow!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn find_cluster<'a>(db: &'a ClusterDb, key: &str) -> Result<&'a ClusterInfo> {
    db.cluster_by_name(key)
        .or_else(|| {
            parse_number(key)
                .and_then(|id| u16::try_from(id).ok())
                .and_then(|id| db.cluster_by_id(id))
        })
        .ok_or_else(|| anyhow!("unknown cluster '{}'", key))
}

/// Find a command by name or id
///
/// With `global` only the profile-wide table is searched; otherwise the
/// cluster's incoming commands, then its outgoing ones.
fn find_command<'a>(
    db: &'a ClusterDb,
    cluster: &'a ClusterInfo,
    key: &str,
    global: bool,
) -> Result<&'a CommandInfo> {
    let id = parse_number(key).and_then(|id| u8::try_from(id).ok());
    let found = if global {
        db.global_command_by_name(key)
            .or_else(|| id.and_then(|id| db.global_command_by_id(id)))
    } else {
        cluster
            .command_in_by_name(key)
            .or_else(|| id.and_then(|id| cluster.command_in_by_id(id)))
            .or_else(|| cluster.command_out_by_name(key))
            .or_else(|| id.and_then(|id| cluster.command_out_by_id(id)))
    };
    found.ok_or_else(|| {
        anyhow!(
            "unknown {}command '{}' for cluster '{}'",
            if global { "global " } else { "" },
            key,
            cluster.name
        )
    })
}

/// Decode a command payload against the schema
pub fn decode_command(
    db: &ClusterDb,
    cluster: &str,
    command: &str,
    global: bool,
    data: &[u8],
) -> Result<Value> {
    let cluster = find_cluster(db, cluster)?;
    let command = find_command(db, cluster, command, global)?;
    let ctx = Context::with_cluster(cluster);
    command
        .decode_payload(&ctx, data)
        .with_context(|| format!("Failed to decode '{}'", command.name))
}

/// Counts reported by `check-schema`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaSummary {
    pub clusters: usize,
    pub attributes: usize,
    pub global_commands: usize,
    pub cluster_commands: usize,
}

pub fn summarize(db: &ClusterDb) -> SchemaSummary {
    let mut summary = SchemaSummary {
        clusters: 0,
        attributes: 0,
        global_commands: db.global_commands().count(),
        cluster_commands: 0,
    };
    for cluster in db.clusters() {
        summary.clusters += 1;
        summary.attributes += cluster.attributes.len();
        summary.cluster_commands += cluster.commands_in.len() + cluster.commands_out.len();
    }
    summary
}
