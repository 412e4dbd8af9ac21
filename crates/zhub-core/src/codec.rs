//! Schema-driven dynamic codec
//!
//! Walks an [`AnyType`] tree against a byte cursor (decode) or a [`Value`]
//! tree (encode). Scalar leaves are delegated to [`crate::scalar`]. Any error
//! aborts the whole call; [`encode`] leaves the output buffer as it found it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::scalar;
use crate::schema::ClusterInfo;
use crate::types::{AnyType, ObjectType, STATUS_KEY, STATUS_SUCCESS, VALUE_KEY};
use crate::value::{Map, Value};

/// Deepest struct/array/object nesting accepted by either direction
pub const MAX_NESTING: usize = 32;

/// Lookup context for a codec call
///
/// With a cluster present, `attribId` values are translated to and from the
/// cluster's attribute names. The context also tracks how deep the current
/// value is nested, so hostile input fails instead of exhausting the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context<'a> {
    pub cluster: Option<&'a ClusterInfo>,
    depth: usize,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(cluster: &'a ClusterInfo) -> Self {
        Self {
            cluster: Some(cluster),
            depth: 0,
        }
    }

    /// Context for one level further down
    pub(crate) fn nested(&self) -> Option<Self> {
        (self.depth < MAX_NESTING).then(|| Self {
            cluster: self.cluster,
            depth: self.depth + 1,
        })
    }

    pub(crate) fn nested_decode(&self) -> Result<Self> {
        self.nested()
            .ok_or_else(|| Error::decode(format!("nesting too deep (limit {})", MAX_NESTING)))
    }

    pub(crate) fn nested_encode(&self) -> Result<Self> {
        self.nested()
            .ok_or_else(|| Error::encode(format!("nesting too deep (limit {})", MAX_NESTING)))
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one value of `ty` from the front of `buf`, advancing it
///
/// Greedy lists run until `buf` is empty, so the slice end must be the end
/// of the enclosing message.
pub fn decode(ctx: &Context<'_>, ty: &AnyType, buf: &mut &[u8]) -> Result<Value> {
    match ty {
        AnyType::Variant => scalar::decode_variant(ctx, buf),
        AnyType::DataType(dt) => scalar::decode(ctx, *dt, buf),
        AnyType::Object(obj) => decode_object(ctx, obj, buf),
        AnyType::ErrorOr(inner) => {
            let status = scalar::read_status(buf)?;
            let mut map = Map::new();
            map.insert(STATUS_KEY.to_string(), Value::from(status));
            if status == STATUS_SUCCESS {
                let value = decode(&ctx.nested_decode()?, inner, buf)?;
                map.insert(VALUE_KEY.to_string(), value);
            }
            Ok(Value::Map(map))
        }
        AnyType::GreedyRepeated(inner) => {
            let ctx = ctx.nested_decode()?;
            let mut items = Vec::new();
            while !buf.is_empty() {
                let before = buf.len();
                items.push(decode(&ctx, inner, buf)?);
                if buf.len() == before {
                    return Err(Error::decode(format!(
                        "repeated {} consumed no input",
                        inner
                    )));
                }
            }
            Ok(Value::Array(items))
        }
    }
}

/// Decode every property of `obj` in declared order
pub fn decode_object(ctx: &Context<'_>, obj: &ObjectType, buf: &mut &[u8]) -> Result<Value> {
    let ctx = ctx.nested_decode()?;
    let mut map = Map::new();
    for entry in &obj.properties {
        let value = decode(&ctx, &entry.ty, buf)?;
        map.insert(entry.name.clone(), value);
    }
    Ok(Value::Map(map))
}

/// Decode `data` completely; leftover bytes are an error
pub fn decode_all(ctx: &Context<'_>, ty: &AnyType, data: &[u8]) -> Result<Value> {
    let mut buf = data;
    let value = decode(ctx, ty, &mut buf)?;
    if !buf.is_empty() {
        return Err(Error::decode(format!(
            "{} trailing bytes after {}",
            buf.len(),
            ty
        )));
    }
    Ok(value)
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode `value` as `ty`, appending to `out`
///
/// On failure `out` is truncated back to its original length.
pub fn encode(ctx: &Context<'_>, ty: &AnyType, value: &Value, out: &mut BytesMut) -> Result<()> {
    let start = out.len();
    let result = encode_into(ctx, ty, value, out);
    if result.is_err() {
        out.truncate(start);
    }
    result
}

/// Encode `value` as `ty` into a fresh buffer
pub fn encode_to_bytes(ctx: &Context<'_>, ty: &AnyType, value: &Value) -> Result<Bytes> {
    let mut out = BytesMut::new();
    encode_into(ctx, ty, value, &mut out)?;
    Ok(out.freeze())
}

/// Encode a map against `obj` into a fresh buffer
pub fn encode_object(ctx: &Context<'_>, obj: &ObjectType, value: &Value) -> Result<Bytes> {
    let mut out = BytesMut::new();
    encode_properties(ctx, obj, value, &mut out)?;
    Ok(out.freeze())
}

fn encode_properties(
    ctx: &Context<'_>,
    obj: &ObjectType,
    value: &Value,
    out: &mut BytesMut,
) -> Result<()> {
    let ctx = ctx.nested_encode()?;
    let map = value
        .as_map()
        .ok_or_else(|| Error::encode(format!("expected object, got {}", value.kind_name())))?;
    for entry in &obj.properties {
        let field = map.get(&entry.name).unwrap_or(&Value::Null);
        encode_into(&ctx, &entry.ty, field, out).map_err(|e| annotate(e, &entry.name))?;
    }
    Ok(())
}

fn encode_into(ctx: &Context<'_>, ty: &AnyType, value: &Value, out: &mut BytesMut) -> Result<()> {
    match ty {
        AnyType::Variant => scalar::encode_variant(ctx, value, out),
        AnyType::DataType(dt) => scalar::encode(ctx, *dt, value, out),
        AnyType::Object(obj) => encode_properties(ctx, obj, value, out),
        AnyType::ErrorOr(inner) => {
            let status = error_or_status(ty, value)?;
            out.put_u8(status);
            if status == STATUS_SUCCESS {
                let field = value.get(VALUE_KEY).unwrap_or(&Value::Null);
                encode_into(&ctx.nested_encode()?, inner, field, out)
                    .map_err(|e| annotate(e, VALUE_KEY))?;
            }
            Ok(())
        }
        AnyType::GreedyRepeated(inner) => {
            let ctx = ctx.nested_encode()?;
            let items = value.as_array().ok_or_else(|| {
                Error::encode(format!("{}: expected array, got {}", ty, value.kind_name()))
            })?;
            for item in items {
                encode_into(&ctx, inner, item, out)?;
            }
            Ok(())
        }
    }
}

/// Status byte of an error-or value; a missing status means success
fn error_or_status(ty: &AnyType, value: &Value) -> Result<u8> {
    let map = value
        .as_map()
        .ok_or_else(|| Error::encode(format!("{}: expected object, got {}", ty, value.kind_name())))?;
    match map.get(STATUS_KEY) {
        None | Some(Value::Null) => Ok(STATUS_SUCCESS),
        Some(status) => status
            .as_u64()
            .and_then(|s| u8::try_from(s).ok())
            .ok_or_else(|| Error::encode(format!("{}: invalid status {}", ty, status))),
    }
}

fn annotate(err: Error, field: &str) -> Error {
    match err {
        Error::EncodeError(msg) => Error::EncodeError(format!("{}: {}", field, msg)),
        other => other,
    }
}

/// Number of bytes [`encode`] would produce
pub fn size_of(ctx: &Context<'_>, ty: &AnyType, value: &Value) -> Result<usize> {
    match ty {
        AnyType::Variant => scalar::variant_size(ctx, value),
        AnyType::DataType(dt) => scalar::size_of(ctx, *dt, value),
        AnyType::Object(obj) => obj.properties.iter().try_fold(0usize, |acc, entry| -> Result<usize> {
            let field = value.get(&entry.name).unwrap_or(&Value::Null);
            Ok(acc + size_of(ctx, &entry.ty, field)?)
        }),
        AnyType::ErrorOr(inner) => match error_or_status(ty, value)? {
            STATUS_SUCCESS => {
                Ok(1 + size_of(ctx, inner, value.get(VALUE_KEY).unwrap_or(&Value::Null))?)
            }
            _ => Ok(1),
        },
        AnyType::GreedyRepeated(inner) => value
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .try_fold(0usize, |acc, item| -> Result<usize> {
                Ok(acc + size_of(ctx, inner, item)?)
            }),
    }
}
