//! Wire rules for individual ZCL datatypes
//!
//! All multi-byte quantities are little-endian. Integer, bitmap and string
//! types reserve their all-ones pattern as "no value": it decodes to
//! [`Value::Null`] and encoding `Null` writes it back.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::Context;
use crate::datatype::{DataType, SizeClass};
use crate::error::{Error, Result};
use crate::float::{FloatFormat, DOUBLE, SEMI, SINGLE};
use crate::value::{Map, Value};

// ============================================================================
// Cursor helpers
// ============================================================================

#[inline]
fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            have: buf.len(),
        });
    }
    Ok(())
}

#[inline]
fn read_uint(buf: &mut &[u8], width: usize) -> Result<u64> {
    ensure(buf, width)?;
    Ok(buf.get_uint_le(width))
}

#[inline]
fn read_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    ensure(buf, len)?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// All-ones pattern of a `width`-byte integer
#[inline]
fn all_ones(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

fn float_format(ty: DataType) -> Option<FloatFormat> {
    match ty {
        DataType::Semi => Some(SEMI),
        DataType::Single => Some(SINGLE),
        DataType::Double => Some(DOUBLE),
        _ => None,
    }
}

fn mismatch(ty: DataType, expected: &str, value: &Value) -> Error {
    Error::encode(format!(
        "{}: expected {}, got {}",
        ty,
        expected,
        value.kind_name()
    ))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode one value of `ty` from the front of `buf`
pub fn decode(ctx: &Context<'_>, ty: DataType, buf: &mut &[u8]) -> Result<Value> {
    use DataType::*;

    if let Some((class, width)) = ty.size_class() {
        return decode_fixed(class, width, buf);
    }
    if let Some(format) = float_format(ty) {
        let v = format.decode(read_uint(buf, format.width())?);
        return Ok(if v.is_nan() { Value::Null } else { Value::Float(v) });
    }

    match ty {
        NoData | Unknown => Ok(Value::Null),
        Bool => match read_uint(buf, 1)? {
            0x00 => Ok(Value::Bool(false)),
            0x01 => Ok(Value::Bool(true)),
            0xff => Ok(Value::Null),
            other => Err(Error::decode(format!("invalid bool value 0x{:02x}", other))),
        },
        OctStr => decode_octets(buf, 1),
        OctStr16 => decode_octets(buf, 2),
        String => decode_string(buf, 1),
        String16 => decode_string(buf, 2),
        Array | Set | Bag => decode_sequence(ctx, buf),
        Struct => decode_struct(ctx, buf),
        AttribId => decode_attrib_id(ctx, buf),
        ClusterId => decode_unsigned(buf, 2),
        Utc | BacOid => decode_unsigned(buf, 4),
        TimeOfDay => decode_fields(buf, &TIME_OF_DAY_FIELDS, 0),
        Date => decode_fields(buf, &DATE_FIELDS, DATE_YEAR_BASE),
        Eui64 => match read_uint(buf, 8)? {
            u64::MAX => Ok(Value::Null),
            raw => Ok(Value::String(format!("{:016X}", raw))),
        },
        Key128 => Ok(read_bytes(buf, 16)?.iter().map(|b| Value::from(*b)).collect()),
        _ => Err(Error::decode(format!("no decoder for {}", ty))),
    }
}

fn decode_fixed(class: SizeClass, width: usize, buf: &mut &[u8]) -> Result<Value> {
    if class == SizeClass::Data {
        return Ok(read_bytes(buf, width)?
            .iter()
            .map(|b| Value::from(*b))
            .collect());
    }

    let raw = read_uint(buf, width)?;
    if raw == all_ones(width) {
        return Ok(Value::Null);
    }

    Ok(match class {
        SizeClass::Bitmap => (0..width * 8)
            .rev()
            .map(|bit| Value::Bool((raw >> bit) & 1 == 1))
            .collect(),
        SizeClass::Signed => {
            let shift = 64 - 8 * width as u32;
            Value::Int(((raw << shift) as i64) >> shift)
        }
        _ => Value::from(raw),
    })
}

fn decode_unsigned(buf: &mut &[u8], width: usize) -> Result<Value> {
    decode_fixed(SizeClass::Unsigned, width, buf)
}

/// Read a length prefix, `None` for the null sentinel
fn read_length(buf: &mut &[u8], prefix: usize) -> Result<Option<usize>> {
    let len = read_uint(buf, prefix)?;
    if len == all_ones(prefix) {
        Ok(None)
    } else {
        Ok(Some(len as usize))
    }
}

fn decode_octets(buf: &mut &[u8], prefix: usize) -> Result<Value> {
    match read_length(buf, prefix)? {
        None => Ok(Value::Null),
        Some(len) => Ok(read_bytes(buf, len)?
            .iter()
            .map(|b| Value::from(*b))
            .collect()),
    }
}

fn decode_string(buf: &mut &[u8], prefix: usize) -> Result<Value> {
    match read_length(buf, prefix)? {
        None => Ok(Value::Null),
        Some(len) => Ok(Value::String(
            read_bytes(buf, len)?.iter().map(|b| char::from(*b)).collect(),
        )),
    }
}

fn decode_sequence(ctx: &Context<'_>, buf: &mut &[u8]) -> Result<Value> {
    let ctx = ctx.nested_decode()?;
    let element_type = DataType::try_from(read_uint(buf, 1)? as u8)?;
    let elements = match read_length(buf, 2)? {
        None => Value::Null,
        Some(count) => (0..count)
            .map(|_| decode(&ctx, element_type, buf))
            .collect::<Result<Vec<_>>>()?
            .into(),
    };

    Ok(Value::map([
        ("element_type", Value::from(element_type.name())),
        ("elements", elements),
    ]))
}

fn decode_struct(ctx: &Context<'_>, buf: &mut &[u8]) -> Result<Value> {
    let ctx = ctx.nested_decode()?;
    match read_length(buf, 2)? {
        None => Ok(Value::Null),
        Some(count) => Ok((0..count)
            .map(|_| decode_variant(&ctx, buf))
            .collect::<Result<Vec<_>>>()?
            .into()),
    }
}

fn decode_attrib_id(ctx: &Context<'_>, buf: &mut &[u8]) -> Result<Value> {
    let id = read_uint(buf, 2)? as u16;
    if id == 0xffff {
        return Ok(Value::Null);
    }
    let name = ctx
        .cluster
        .and_then(|cluster| cluster.attribute_by_id(id))
        .map(|attr| attr.name.clone());
    Ok(match name {
        Some(name) => Value::String(name),
        None => Value::from(id),
    })
}

const TIME_OF_DAY_FIELDS: [&str; 4] = ["hours", "minutes", "seconds", "hundredths"];
const DATE_FIELDS: [&str; 4] = ["year", "month", "day", "weekday"];
const DATE_YEAR_BASE: i64 = 1900;

/// Four single-byte fields, each with its own 0xFF sentinel; the first
/// field is offset by `first_offset`
fn decode_fields(buf: &mut &[u8], names: &[&str; 4], first_offset: i64) -> Result<Value> {
    let raw = read_bytes(buf, 4)?;
    let mut map = Map::new();
    for (i, (name, byte)) in names.iter().zip(raw).enumerate() {
        let value = match *byte {
            0xff => Value::Null,
            b if i == 0 => Value::Int(b as i64 + first_offset),
            b => Value::from(b),
        };
        map.insert((*name).to_string(), value);
    }
    Ok(Value::Map(map))
}

/// Read a one-byte ZCL status
pub fn read_status(buf: &mut &[u8]) -> Result<u8> {
    Ok(read_uint(buf, 1)? as u8)
}

/// Decode a tag byte followed by a value of that type
///
/// Yields `{"type": <name>, "value": <value>}`.
pub fn decode_variant(ctx: &Context<'_>, buf: &mut &[u8]) -> Result<Value> {
    let ty = DataType::try_from(read_uint(buf, 1)? as u8)?;
    let value = decode(ctx, ty, buf)?;
    Ok(Value::variant(ty.name(), value))
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode `value` as `ty`, appending to `out`
pub fn encode(ctx: &Context<'_>, ty: DataType, value: &Value, out: &mut BytesMut) -> Result<()> {
    use DataType::*;

    if let Some((class, width)) = ty.size_class() {
        return encode_fixed(ty, class, width, value, out);
    }
    if let Some(format) = float_format(ty) {
        let number = match value {
            Value::Null => f64::NAN,
            Value::String(s) => parse_infinity(s).ok_or_else(|| mismatch(ty, "number", value))?,
            other => other.as_f64().ok_or_else(|| mismatch(ty, "number", other))?,
        };
        out.put_uint_le(format.encode(number), format.width());
        return Ok(());
    }

    match ty {
        NoData | Unknown => match value {
            Value::Null => Ok(()),
            other => Err(mismatch(ty, "null", other)),
        },
        Bool => {
            let byte = match value {
                Value::Null => 0xff,
                Value::Bool(b) => *b as u8,
                other => return Err(mismatch(ty, "bool", other)),
            };
            out.put_u8(byte);
            Ok(())
        }
        OctStr | OctStr16 | String | String16 => encode_string(ty, value, out),
        Array | Set | Bag => encode_sequence(ctx, ty, value, out),
        Struct => encode_struct(ctx, value, out),
        AttribId => encode_attrib_id(ctx, value, out),
        ClusterId => encode_fixed(ty, SizeClass::Unsigned, 2, value, out),
        Utc | BacOid => encode_fixed(ty, SizeClass::Unsigned, 4, value, out),
        TimeOfDay => encode_fields(ty, value, &TIME_OF_DAY_FIELDS, 0, out),
        Date => encode_fields(ty, value, &DATE_FIELDS, DATE_YEAR_BASE, out),
        Eui64 => encode_eui64(value, out),
        Key128 => encode_byte_array(ty, value, 16, out),
        _ => Err(Error::encode(format!("no encoder for {}", ty))),
    }
}

/// Infinities travel through JSON as strings
fn parse_infinity(s: &str) -> Option<f64> {
    match s {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn sentinel_collision(ty: DataType, value: &Value) -> Error {
    Error::encode(format!("{}: value {} is reserved for null", ty, value))
}

fn encode_fixed(
    ty: DataType,
    class: SizeClass,
    width: usize,
    value: &Value,
    out: &mut BytesMut,
) -> Result<()> {
    let bits = 8 * width as u32;
    let sentinel = all_ones(width);

    if class == SizeClass::Data {
        return encode_byte_array(ty, value, width, out);
    }
    if value.is_null() {
        out.put_uint_le(sentinel, width);
        return Ok(());
    }

    let raw = match class {
        SizeClass::Bitmap => {
            let bools = value
                .as_array()
                .ok_or_else(|| mismatch(ty, "array of bool", value))?;
            if bools.len() != width * 8 {
                return Err(Error::encode(format!(
                    "{}: expected {} bits, got {}",
                    ty,
                    width * 8,
                    bools.len()
                )));
            }
            bools.iter().try_fold(0u64, |acc, bit| match bit {
                Value::Bool(b) => Ok((acc << 1) | *b as u64),
                other => Err(mismatch(ty, "bool bit", other)),
            })?
        }
        SizeClass::Signed => {
            let v = value
                .as_i64()
                .ok_or_else(|| mismatch(ty, "signed integer", value))?;
            let fits = bits == 64 || (v >= -(1i64 << (bits - 1)) && v < (1i64 << (bits - 1)));
            if !fits {
                return Err(Error::encode(format!(
                    "Value {} does not fit in {} bits",
                    v, bits
                )));
            }
            (v as u64) & sentinel
        }
        _ => {
            let v = match value {
                Value::Int(i) if *i < 0 => {
                    return Err(Error::encode(format!(
                        "Value {} does not fit in {} bits",
                        i, bits
                    )))
                }
                other => other
                    .as_u64()
                    .ok_or_else(|| mismatch(ty, "unsigned integer", other))?,
            };
            if bits < 64 && v >> bits != 0 {
                return Err(Error::encode(format!(
                    "Value {} does not fit in {} bits",
                    v, bits
                )));
            }
            v
        }
    };

    if raw == sentinel {
        return Err(sentinel_collision(ty, value));
    }
    out.put_uint_le(raw, width);
    Ok(())
}

fn byte_of(ty: DataType, value: &Value) -> Result<u8> {
    value
        .as_u64()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| Error::encode(format!("{}: expected byte, got {}", ty, value)))
}

fn encode_byte_array(ty: DataType, value: &Value, len: usize, out: &mut BytesMut) -> Result<()> {
    let items = value
        .as_array()
        .ok_or_else(|| mismatch(ty, "array of bytes", value))?;
    if items.len() != len {
        return Err(Error::encode(format!(
            "{}: expected {} bytes, got {}",
            ty,
            len,
            items.len()
        )));
    }
    for item in items {
        out.put_u8(byte_of(ty, item)?);
    }
    Ok(())
}

/// Bytes of a string or octet string value; strings map code points 1:1
fn string_bytes(ty: DataType, value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => s
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    Error::encode(format!("{}: character {:?} is outside 0..=255", ty, c))
                })
            })
            .collect(),
        Value::Array(items) if matches!(ty, DataType::OctStr | DataType::OctStr16) => {
            items.iter().map(|item| byte_of(ty, item)).collect()
        }
        other => Err(mismatch(ty, "string", other)),
    }
}

fn encode_string(ty: DataType, value: &Value, out: &mut BytesMut) -> Result<()> {
    let prefix = match ty {
        DataType::OctStr16 | DataType::String16 => 2,
        _ => 1,
    };
    let sentinel = all_ones(prefix);
    if value.is_null() {
        out.put_uint_le(sentinel, prefix);
        return Ok(());
    }

    let bytes = string_bytes(ty, value)?;
    if bytes.len() as u64 >= sentinel {
        return Err(Error::encode(format!(
            "{}: length {} exceeds {}",
            ty,
            bytes.len(),
            sentinel - 1
        )));
    }
    out.put_uint_le(bytes.len() as u64, prefix);
    out.extend_from_slice(&bytes);
    Ok(())
}

fn encode_sequence(ctx: &Context<'_>, ty: DataType, value: &Value, out: &mut BytesMut) -> Result<()> {
    let ctx = ctx.nested_encode()?;
    let element_type = value
        .get("element_type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::encode(format!("{}: missing string 'element_type'", ty)))?;
    let element_type = DataType::from_name(element_type)
        .ok_or_else(|| Error::encode(format!("{}: unknown element type '{}'", ty, element_type)))?;

    out.put_u8(element_type.as_u8());
    match value.get("elements").unwrap_or(&Value::Null) {
        Value::Null => out.put_u16_le(0xffff),
        Value::Array(items) => {
            if items.len() >= 0xffff {
                return Err(Error::encode(format!("{}: too many elements", ty)));
            }
            out.put_u16_le(items.len() as u16);
            for item in items {
                encode(&ctx, element_type, item, out)?;
            }
        }
        other => return Err(mismatch(ty, "array of elements", other)),
    }
    Ok(())
}

fn encode_struct(ctx: &Context<'_>, value: &Value, out: &mut BytesMut) -> Result<()> {
    let ctx = ctx.nested_encode()?;
    match value {
        Value::Null => out.put_u16_le(0xffff),
        Value::Array(items) => {
            if items.len() >= 0xffff {
                return Err(Error::encode("struct: too many members"));
            }
            out.put_u16_le(items.len() as u16);
            for item in items {
                encode_variant(&ctx, item, out)?;
            }
        }
        other => return Err(mismatch(DataType::Struct, "array of variants", other)),
    }
    Ok(())
}

fn encode_attrib_id(ctx: &Context<'_>, value: &Value, out: &mut BytesMut) -> Result<()> {
    let id = match value {
        Value::Null => 0xffff,
        Value::String(name) => {
            let cluster = ctx.cluster.ok_or_else(|| {
                Error::encode(format!(
                    "attribId: cannot resolve '{}' without a cluster context",
                    name
                ))
            })?;
            cluster
                .attribute_by_name(name)
                .map(|attr| attr.id)
                .ok_or_else(|| {
                    Error::encode(format!(
                        "attribId: cluster '{}' has no attribute '{}'",
                        cluster.name, name
                    ))
                })?
        }
        other => other
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| Error::encode(format!("attribId: invalid attribute id {}", other)))?,
    };
    if id == 0xffff && !value.is_null() {
        return Err(sentinel_collision(DataType::AttribId, value));
    }
    out.put_u16_le(id);
    Ok(())
}

fn encode_fields(
    ty: DataType,
    value: &Value,
    names: &[&str; 4],
    first_offset: i64,
    out: &mut BytesMut,
) -> Result<()> {
    if value.is_null() {
        out.put_u32_le(u32::MAX);
        return Ok(());
    }
    let map = value
        .as_map()
        .ok_or_else(|| mismatch(ty, "object", value))?;

    for (i, name) in names.iter().enumerate() {
        let byte = match map.get(*name).unwrap_or(&Value::Null) {
            Value::Null => 0xff,
            field => {
                let offset = if i == 0 { first_offset } else { 0 };
                field
                    .as_i64()
                    .map(|v| v - offset)
                    .filter(|v| (0..0xff).contains(v))
                    .ok_or_else(|| {
                        Error::encode(format!("{}: field '{}' out of range: {}", ty, name, field))
                    })? as u8
            }
        };
        out.put_u8(byte);
    }
    Ok(())
}

fn encode_eui64(value: &Value, out: &mut BytesMut) -> Result<()> {
    let raw = match value {
        Value::Null => u64::MAX,
        Value::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::encode(format!("EUI64: expected 16 hex digits, got '{}'", s)));
            }
            u64::from_str_radix(digits, 16)
                .map_err(|_| Error::encode(format!("EUI64: invalid hex '{}'", s)))?
        }
        other => other
            .as_u64()
            .ok_or_else(|| mismatch(DataType::Eui64, "hex string", other))?,
    };
    if raw == u64::MAX && !value.is_null() {
        return Err(sentinel_collision(DataType::Eui64, value));
    }
    out.put_u64_le(raw);
    Ok(())
}

/// Encode a `{"type", "value"}` variant: tag byte, then the value
///
/// `Null` is written as a bare `nodata` tag; a missing `value` key means null.
pub fn encode_variant(ctx: &Context<'_>, value: &Value, out: &mut BytesMut) -> Result<()> {
    let map = match value {
        Value::Null => {
            out.put_u8(DataType::NoData.as_u8());
            return Ok(());
        }
        Value::Map(map) => map,
        other => {
            return Err(Error::encode(format!(
                "variant: expected object with 'type', got {}",
                other.kind_name()
            )))
        }
    };
    let name = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::encode("variant: missing string 'type'"))?;
    let ty = DataType::from_name(name)
        .ok_or_else(|| Error::encode(format!("variant: unknown type '{}'", name)))?;

    out.put_u8(ty.as_u8());
    encode(ctx, ty, map.get("value").unwrap_or(&Value::Null), out)
}

// ============================================================================
// Sizing
// ============================================================================

/// Number of bytes `encode` would produce for `value`
pub fn size_of(ctx: &Context<'_>, ty: DataType, value: &Value) -> Result<usize> {
    use DataType::*;

    if let Some((_, width)) = ty.size_class() {
        return Ok(width);
    }
    if let Some(format) = float_format(ty) {
        return Ok(format.width());
    }

    Ok(match ty {
        NoData | Unknown => 0,
        Bool => 1,
        ClusterId | AttribId => 2,
        Utc | BacOid | TimeOfDay | Date => 4,
        Eui64 => 8,
        Key128 => 16,
        OctStr | String | OctStr16 | String16 => {
            let prefix = if matches!(ty, OctStr16 | String16) { 2 } else { 1 };
            match value {
                Value::Null => prefix,
                other => prefix + string_bytes(ty, other)?.len(),
            }
        }
        Array | Set | Bag => {
            let ctx = ctx.nested_encode()?;
            let element_type = value
                .get("element_type")
                .and_then(Value::as_str)
                .and_then(DataType::from_name)
                .ok_or_else(|| Error::encode(format!("{}: missing or unknown 'element_type'", ty)))?;
            let mut size = 3;
            if let Some(items) = value.get("elements").and_then(Value::as_array) {
                for item in items {
                    size += size_of(&ctx, element_type, item)?;
                }
            }
            size
        }
        Struct => {
            let ctx = ctx.nested_encode()?;
            let mut size = 2;
            if let Some(items) = value.as_array() {
                for item in items {
                    size += variant_size(&ctx, item)?;
                }
            }
            size
        }
        _ => return Err(Error::encode(format!("no encoder for {}", ty))),
    })
}

/// Size of a tagged variant value including the tag byte
pub fn variant_size(ctx: &Context<'_>, value: &Value) -> Result<usize> {
    if value.is_null() {
        return Ok(1);
    }
    let ty = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(DataType::from_name)
        .ok_or_else(|| Error::encode("variant: missing or unknown 'type'"))?;
    Ok(1 + size_of(ctx, ty, value.get("value").unwrap_or(&Value::Null))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(ty: DataType, bytes: &[u8]) -> Result<Value> {
        let mut buf = bytes;
        decode(&Context::default(), ty, &mut buf)
    }

    fn enc(ty: DataType, value: &Value) -> Result<Vec<u8>> {
        let mut out = BytesMut::new();
        encode(&Context::default(), ty, value, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn test_signed_sign_extension() {
        assert_eq!(dec(DataType::Int24, &[0x00, 0x00, 0x80]).unwrap(), Value::Int(-0x800000));
        assert_eq!(dec(DataType::Int8, &[0x7f]).unwrap(), Value::Int(127));
        assert_eq!(dec(DataType::Int8, &[0xfe]).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_range_checks() {
        let err = enc(DataType::Uint8, &Value::Int(256)).unwrap_err();
        assert_eq!(err.to_string(), "encode error: Value 256 does not fit in 8 bits");
        assert!(enc(DataType::Int8, &Value::Int(128)).is_err());
        assert!(enc(DataType::Int8, &Value::Int(-129)).is_err());
        assert!(enc(DataType::Uint16, &Value::Int(-1)).is_err());
        assert_eq!(enc(DataType::Int8, &Value::Int(-128)).unwrap(), vec![0x80]);
    }

    #[test]
    fn test_sentinel_collision_rejected() {
        assert!(enc(DataType::Uint8, &Value::Int(255)).is_err());
        assert!(enc(DataType::Int16, &Value::Int(-1)).is_err());
        assert!(enc(DataType::Map8, &Value::Array(vec![Value::Bool(true); 8])).is_err());

        let err = enc(DataType::AttribId, &Value::from(0xffffu16)).unwrap_err();
        assert!(err.to_string().contains("reserved for null"));
        assert!(enc(DataType::Eui64, &Value::from("FFFFFFFFFFFFFFFF")).is_err());
        assert!(enc(DataType::Eui64, &Value::from(u64::MAX)).is_err());

        assert_eq!(enc(DataType::AttribId, &Value::Null).unwrap(), vec![0xff, 0xff]);
        assert_eq!(enc(DataType::Eui64, &Value::Null).unwrap(), vec![0xff; 8]);
    }

    #[test]
    fn test_uint64_extremes() {
        let max = u64::MAX - 1;
        let bytes = enc(DataType::Uint64, &Value::from(max)).unwrap();
        assert_eq!(bytes, max.to_le_bytes());
        assert_eq!(dec(DataType::Uint64, &bytes).unwrap(), Value::UInt(max));
        assert_eq!(dec(DataType::Uint64, &[0xff; 8]).unwrap(), Value::Null);
    }

    #[test]
    fn test_time_of_day_and_date() {
        let tod = dec(DataType::TimeOfDay, &[13, 45, 0xff, 5]).unwrap();
        assert_eq!(tod.get("hours"), Some(&Value::Int(13)));
        assert_eq!(tod.get("seconds"), Some(&Value::Null));
        assert_eq!(enc(DataType::TimeOfDay, &tod).unwrap(), vec![13, 45, 0xff, 5]);

        let date = dec(DataType::Date, &[124, 2, 29, 4]).unwrap();
        assert_eq!(date.get("year"), Some(&Value::Int(2024)));
        assert_eq!(enc(DataType::Date, &date).unwrap(), vec![124, 2, 29, 4]);
    }

    #[test]
    fn test_eui64() {
        let bytes = [0x19, 0xf5, 0x83, 0x01, 0x00, 0x8d, 0x15, 0x00];
        let v = dec(DataType::Eui64, &bytes).unwrap();
        assert_eq!(v, Value::from("00158D000183F519"));
        assert_eq!(enc(DataType::Eui64, &v).unwrap(), bytes);
        assert_eq!(enc(DataType::Eui64, &Value::from("0x00158D000183F519")).unwrap(), bytes);
    }

    #[test]
    fn test_eui64_rejects_malformed_strings() {
        for text in [
            "0x0x00158D000183",
            "+0158D000183F519",
            "-0158D000183F519",
            "00158D000183F51",
            "00158D000183F519A",
            "00158D00 183F519",
        ] {
            assert!(enc(DataType::Eui64, &Value::from(text)).is_err(), "{}", text);
        }
    }

    #[test]
    fn test_float_infinity_strings() {
        assert_eq!(enc(DataType::Single, &Value::from("inf")).unwrap(), vec![0, 0, 0x80, 0x7f]);
        assert_eq!(enc(DataType::Single, &Value::from("+inf")).unwrap(), vec![0, 0, 0x80, 0x7f]);
        assert_eq!(enc(DataType::Semi, &Value::from("-inf")).unwrap(), vec![0x00, 0xfc]);
        assert!(enc(DataType::Single, &Value::from("nan")).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let mut bytes = Vec::new();
        for _ in 0..200 {
            bytes.extend_from_slice(&[0x01, 0x00, DataType::Struct.as_u8()]);
        }
        bytes.extend_from_slice(&[0x00, 0x00]);
        let err = dec(DataType::Struct, &bytes).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));

        let mut value = Value::Array(vec![]);
        for _ in 0..200 {
            value = Value::Array(vec![Value::variant("struct", value)]);
        }
        assert!(enc(DataType::Struct, &value).is_err());
    }

    #[test]
    fn test_latin1_strings() {
        let v = dec(DataType::String, &[0x02, 0xe9, 0x41]).unwrap();
        assert_eq!(v, Value::from("\u{e9}A"));
        assert_eq!(enc(DataType::String, &v).unwrap(), vec![0x02, 0xe9, 0x41]);
        assert!(enc(DataType::String, &Value::from("\u{263a}")).is_err());
    }

    #[test]
    fn test_size_of_matches_encode() {
        let ctx = Context::default();
        let cases = [
            (DataType::Uint24, Value::Int(5)),
            (DataType::String16, Value::from("abc")),
            (DataType::OctStr, Value::Null),
            (
                DataType::Array,
                Value::map([
                    ("element_type", Value::from("uint16")),
                    ("elements", Value::Array(vec![Value::Int(1), Value::Int(2)])),
                ]),
            ),
            (
                DataType::Struct,
                Value::Array(vec![Value::variant("bool", true), Value::Null]),
            ),
        ];
        for (ty, value) in cases {
            let encoded = enc(ty, &value).unwrap();
            assert_eq!(size_of(&ctx, ty, &value).unwrap(), encoded.len(), "{}", ty);
        }
    }
}
