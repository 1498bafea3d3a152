//! Binary object encoding
//!
//! Values are written type code first, then the payload. Containers write their
//! header (type id, count, map subtype) before recursing into children. Map
//! entries go out in sorted key order so equal maps always produce identical
//! bytes.

use bytes::BufMut;

use crate::error::{Result, ThinError};

use super::types::{BinaryType, Layout, ParsingStrategy, TypeDescriptor, MAP_SUBTYPE, OBJECT_ARRAY_TYPE_ID};
use super::decode::check_depth;
use super::Value;

/// Encode a value using its default (inferred) type
pub fn serialize(value: &Value) -> Result<Vec<u8>> {
    encode_entry(value, None)
}

/// Encode a value, optionally forcing its logical type
///
/// Null always encodes as the null type, whatever is forced.
pub fn encode_entry(value: &Value, forced: Option<BinaryType>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(value, forced, &mut out)?;
    Ok(out)
}

/// Append the encoding of `value` to `out`
pub fn encode_into(value: &Value, forced: Option<BinaryType>, out: &mut Vec<u8>) -> Result<()> {
    encode_at(value, forced, out, 0)
}

fn encode_at(value: &Value, forced: Option<BinaryType>, out: &mut Vec<u8>, depth: usize) -> Result<()> {
    let ty = if value.is_null() {
        BinaryType::NativeNull
    } else {
        forced.unwrap_or_else(|| BinaryType::infer(value))
    };
    let desc = ty.descriptor();

    match desc.layout {
        Layout::Object => Err(ThinError::UnsupportedType(format!(
            "{}: complex object (class) values are not supported, use a map",
            desc.name
        ))),
        Layout::Null => {
            out.put_u8(desc.code);
            Ok(())
        }
        Layout::Scalar(strategy) => {
            out.put_u8(desc.code);
            encode_scalar(value, desc, strategy, out)
        }
        Layout::Array => {
            check_depth(depth, out.len())?;
            out.put_u8(desc.code);
            encode_array(value, ty, desc, out, depth)
        }
        Layout::Map => {
            check_depth(depth, out.len())?;
            out.put_u8(desc.code);
            encode_map(value, desc, out, depth)
        }
    }
}

// =============================================================================
// Containers
// =============================================================================

fn encode_array(
    value: &Value,
    ty: BinaryType,
    desc: &TypeDescriptor,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    let items = value.as_list().ok_or_else(|| mismatch(desc, value))?;

    if desc.has_type_id {
        out.put_i32_le(OBJECT_ARRAY_TYPE_ID);
    }
    out.put_i32_le(wire_len(items.len(), desc)?);

    let item_type = ty.item_type();
    let mut scratch = Vec::new();
    for item in items {
        encode_child(item, item_type, desc, &mut scratch, out, depth + 1)?;
    }
    Ok(())
}

fn encode_map(value: &Value, desc: &TypeDescriptor, out: &mut Vec<u8>, depth: usize) -> Result<()> {
    let map = value.as_map().ok_or_else(|| mismatch(desc, value))?;

    out.put_i32_le(wire_len(map.len(), desc)?);
    out.put_u8(MAP_SUBTYPE);

    let mut scratch = Vec::new();
    for (key, item) in map.sorted_entries() {
        encode_child(key, None, desc, &mut scratch, out, depth + 1)?;
        encode_child(item, None, desc, &mut scratch, out, depth + 1)?;
    }
    Ok(())
}

/// Encode one container element, dropping its type code unless the container
/// keeps per-element codes
fn encode_child(
    item: &Value,
    item_type: Option<BinaryType>,
    container: &TypeDescriptor,
    scratch: &mut Vec<u8>,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    if container.includes_item_type_code {
        return encode_at(item, item_type, out, depth);
    }

    // Without a type code there is no way to mark an element as null
    if item.is_null() {
        return Err(ThinError::TypeMismatch {
            type_name: container.name,
            value: "null element".to_string(),
        });
    }

    scratch.clear();
    encode_at(item, item_type, scratch, depth)?;
    out.extend_from_slice(&scratch[1..]);
    Ok(())
}

// =============================================================================
// Scalars
// =============================================================================

fn encode_scalar(
    value: &Value,
    desc: &TypeDescriptor,
    strategy: ParsingStrategy,
    out: &mut Vec<u8>,
) -> Result<()> {
    match strategy {
        ParsingStrategy::IntLe => {
            let size = desc.fixed_size.unwrap_or(8);
            if let Some(mapping) = desc.value_map {
                let flag = value.as_bool().ok_or_else(|| mismatch(desc, value))?;
                let (wire, _) = mapping
                    .iter()
                    .find(|(_, mapped)| *mapped == flag)
                    .ok_or_else(|| mismatch(desc, value))?;
                out.put_uint_le(*wire as u64, size);
                return Ok(());
            }

            let n = value.as_i64().ok_or_else(|| mismatch(desc, value))?;
            if !fits_in(n, size) {
                return Err(mismatch(desc, value));
            }
            out.put_int_le(n, size);
            Ok(())
        }
        ParsingStrategy::FloatLe => {
            let n = value.as_f64().ok_or_else(|| mismatch(desc, value))?;
            match desc.fixed_size {
                Some(4) => {
                    // Infinities and NaN carry over; finite values must stay finite
                    if n.is_finite() && !(f32::MIN as f64..=f32::MAX as f64).contains(&n) {
                        return Err(mismatch(desc, value));
                    }
                    out.put_f32_le(n as f32)
                }
                _ => out.put_f64_le(n),
            }
            Ok(())
        }
        ParsingStrategy::Utf8 => {
            let text = value.as_str().ok_or_else(|| mismatch(desc, value))?;
            let bytes = text.as_bytes();

            if !desc.skip_length_header {
                out.put_i32_le(wire_len(bytes.len(), desc)?);
            }
            if let Some(width) = desc.zero_pad_width {
                if bytes.len() > width {
                    return Err(mismatch(desc, value));
                }
                out.put_bytes(0, width - bytes.len());
            }
            out.put_slice(bytes);
            Ok(())
        }
        ParsingStrategy::RawBytes => {
            let bytes = match value {
                Value::Bytes(bytes) => bytes,
                other => return Err(mismatch(desc, other)),
            };
            out.put_i32_le(wire_len(bytes.len(), desc)?);
            out.put_slice(bytes);
            Ok(())
        }
        ParsingStrategy::UuidBytes => match value {
            Value::Uuid(uuid) => {
                out.put_slice(uuid.as_bytes());
                Ok(())
            }
            other => Err(mismatch(desc, other)),
        },
    }
}

/// Whether `n` is representable as a signed integer of `size` bytes
fn fits_in(n: i64, size: usize) -> bool {
    if size >= 8 {
        return true;
    }
    let bits = (size * 8) as u32;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&n)
}

fn wire_len(len: usize, desc: &TypeDescriptor) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        ThinError::Serialization(format!("{} too large: {} elements", desc.name, len))
    })
}

fn mismatch(desc: &TypeDescriptor, value: &Value) -> ThinError {
    ThinError::TypeMismatch {
        type_name: desc.name,
        value: format!("{} value {}", value.kind(), value),
    }
}
