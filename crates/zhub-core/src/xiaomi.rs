//! Xiaomi `0xFF01` Basic-cluster attribute
//!
//! Xiaomi sensors pack their periodic heartbeat (battery voltage, RSSI,
//! temperature, ...) into a `string` attribute whose bytes are a list of
//! `tag, variant` pairs.

use crate::codec::Context;
use crate::error::{Error, Result};
use crate::scalar;
use crate::value::{Map, Value};

/// Basic cluster id and the Xiaomi heartbeat attribute id
pub const BASIC_CLUSTER: u16 = 0x0000;
pub const FF01_ATTRIBUTE: u16 = 0xff01;

/// Decode the packed `tag, variant` list into a map keyed by decimal tag
pub fn decode_ff01(mut data: &[u8]) -> Result<Value> {
    let ctx = Context::new();
    let mut map = Map::new();
    while let Some((&tag, rest)) = data.split_first() {
        data = rest;
        let value = scalar::decode_variant(&ctx, &mut data)
            .map_err(|e| Error::decode(format!("FF01 tag {}: {}", tag, e)))?;
        map.insert(tag.to_string(), value);
    }
    Ok(Value::Map(map))
}

/// Raw bytes of an FF01 attribute value as decoded from its `string` or `octstr` form
pub fn ff01_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}
