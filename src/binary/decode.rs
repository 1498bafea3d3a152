//! Binary object decoding
//!
//! Every call takes the buffer and an offset and returns the decoded value
//! together with the offset just past it. There is no shared cursor; callers
//! thread offsets themselves.

use bytes::Buf;
use uuid::Uuid;

use crate::error::{Result, ThinError};

use super::types::{self, Layout, ParsingStrategy, TypeDescriptor};
use super::{Value, ValueMap};

/// Deepest container nesting accepted on either side of the codec
pub const MAX_NESTING_DEPTH: usize = 512;

// =============================================================================
// Decode Observers
// =============================================================================

/// Receives one callback per decoded entry (including array elements whose
/// type code is implied by the container)
pub trait DecodeObserver {
    fn on_entry(&mut self, offset: usize, code: u8);
}

/// Observer that ignores everything
struct NoTrace;

impl DecodeObserver for NoTrace {
    fn on_entry(&mut self, _offset: usize, _code: u8) {}
}

/// Records the type codes met while decoding
#[derive(Debug, Clone, Default)]
pub struct TypeTrace {
    first: Option<u8>,
    entries: Vec<(usize, u8)>,
}

impl TypeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type code of the outermost entry
    pub fn first_type_code(&self) -> Option<u8> {
        self.first
    }

    /// Every `(offset, code)` seen, in decode order
    pub fn entries(&self) -> &[(usize, u8)] {
        &self.entries
    }
}

impl DecodeObserver for TypeTrace {
    fn on_entry(&mut self, offset: usize, code: u8) {
        if self.first.is_none() {
            self.first = Some(code);
        }
        self.entries.push((offset, code));
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Decode a whole buffer holding one top-level binary object
pub fn deserialize(buf: &[u8]) -> Result<Value> {
    decode_at(buf, 0, None, &mut NoTrace, 0).map(|(value, _)| value)
}

/// Decode a top-level binary object, reporting entries to `observer`
pub fn deserialize_traced(buf: &[u8], observer: &mut dyn DecodeObserver) -> Result<Value> {
    decode_at(buf, 0, None, observer, 0).map(|(value, _)| value)
}

/// Decode one entry at `offset`
///
/// `forced_code` supplies the type code when the buffer doesn't carry it
/// (elements of homogeneous arrays). Returns the value and the next offset.
pub fn decode_entry(
    buf: &[u8],
    offset: usize,
    forced_code: Option<u8>,
    trace: Option<&mut dyn DecodeObserver>,
) -> Result<(Value, usize)> {
    match trace {
        Some(observer) => decode_at(buf, offset, forced_code, observer, 0),
        None => decode_at(buf, offset, forced_code, &mut NoTrace, 0),
    }
}

/// Decode `count` consecutive self-typed entries starting at `offset`
pub fn decode_entries(buf: &[u8], offset: usize, count: usize) -> Result<(Vec<Value>, usize)> {
    let mut values = Vec::with_capacity(count.min(buf.len().saturating_sub(offset)));
    let mut pos = offset;
    for _ in 0..count {
        let (value, next) = decode_at(buf, pos, None, &mut NoTrace, 0)?;
        values.push(value);
        pos = next;
    }
    Ok((values, pos))
}

/// Advance past `count` self-typed entries without keeping them
pub fn skip_entries(buf: &[u8], offset: usize, count: usize) -> Result<usize> {
    let mut pos = offset;
    for _ in 0..count {
        let (_, next) = decode_at(buf, pos, None, &mut NoTrace, 0)?;
        pos = next;
    }
    Ok(pos)
}

// =============================================================================
// Recursive Decoder
// =============================================================================

fn decode_at(
    buf: &[u8],
    offset: usize,
    forced_code: Option<u8>,
    observer: &mut dyn DecodeObserver,
    depth: usize,
) -> Result<(Value, usize)> {
    let mut pos = offset;
    let code = match forced_code {
        Some(code) => code,
        None => {
            let code = take(buf, pos, 1, "type code")?[0];
            pos += 1;
            code
        }
    };
    observer.on_entry(offset, code);

    let ty = types::lookup(code).map_err(|_| {
        ThinError::UnknownType(format!("unknown type code {} at offset {}", code, offset))
    })?;
    let desc = ty.descriptor();

    match desc.layout {
        Layout::Object => Err(ThinError::UnsupportedType(format!(
            "complex object (class) at offset {} is not supported, use a map",
            offset
        ))),
        Layout::Null => Ok((Value::Null, pos)),
        Layout::Scalar(strategy) => decode_scalar(buf, pos, desc, strategy),
        Layout::Array => {
            check_depth(depth, offset)?;
            if desc.has_type_id {
                // Element type id: meaningless to the client
                take(buf, pos, 4, "array type id")?;
                pos += 4;
            }
            let count = read_len(buf, pos, "array length")?;
            pos += 4;

            let mut items = Vec::with_capacity(count.min(buf.len() - pos));
            for _ in 0..count {
                let (item, next) = decode_at(buf, pos, desc.item_code, observer, depth + 1)?;
                items.push(item);
                pos = next;
            }
            Ok((Value::List(items), pos))
        }
        Layout::Map => {
            check_depth(depth, offset)?;
            let count = read_len(buf, pos, "map size")?;
            pos += 4;
            // Map subtype: unused
            take(buf, pos, 1, "map subtype")?;
            pos += 1;

            let mut map = ValueMap::with_capacity(count.min(buf.len() - pos));
            for _ in 0..count {
                let (key, next) = decode_at(buf, pos, None, observer, depth + 1)?;
                let (value, next) = decode_at(buf, next, None, observer, depth + 1)?;
                map.insert(key, value);
                pos = next;
            }
            Ok((Value::Map(map), pos))
        }
    }
}

fn decode_scalar(
    buf: &[u8],
    mut pos: usize,
    desc: &TypeDescriptor,
    strategy: ParsingStrategy,
) -> Result<(Value, usize)> {
    match strategy {
        ParsingStrategy::Utf8 => {
            let len = if desc.skip_length_header {
                desc.fixed_size.unwrap_or(2)
            } else {
                let len = read_len(buf, pos, "string length")?;
                pos += 4;
                len
            };
            let raw = take(buf, pos, len, desc.name)?;
            pos += len;

            let text = if desc.zero_pad_width.is_some() {
                let start = raw.iter().position(|&b| b != 0).unwrap_or(raw.len());
                &raw[start..]
            } else {
                raw
            };

            let text = std::str::from_utf8(text).map_err(|e| {
                ThinError::Serialization(format!("invalid UTF-8 in {}: {}", desc.name, e))
            })?;
            Ok((Value::String(text.to_string()), pos))
        }
        ParsingStrategy::IntLe => {
            let size = desc.fixed_size.unwrap_or(8);
            let raw = take(buf, pos, size, desc.name)?;
            pos += size;

            if let Some(mapping) = desc.value_map {
                let byte = raw[0];
                let value = mapping
                    .iter()
                    .find(|(wire, _)| *wire == byte)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        ThinError::Serialization(format!(
                            "invalid {} byte 0x{:02x} at offset {}",
                            desc.name,
                            byte,
                            pos - size
                        ))
                    })?;
                return Ok((Value::Bool(value), pos));
            }

            let mut cursor = raw;
            let value = match size {
                1 => Value::Byte(cursor.get_i8()),
                2 => Value::Short(cursor.get_i16_le()),
                4 => Value::Int(cursor.get_i32_le()),
                8 => Value::Long(cursor.get_i64_le()),
                other => {
                    return Err(ThinError::Serialization(format!(
                        "unsupported integer width {} for {}",
                        other, desc.name
                    )))
                }
            };
            Ok((value, pos))
        }
        ParsingStrategy::FloatLe => {
            let size = desc.fixed_size.unwrap_or(8);
            let mut cursor = take(buf, pos, size, desc.name)?;
            pos += size;
            let value = match size {
                4 => Value::Float(cursor.get_f32_le()),
                8 => Value::Double(cursor.get_f64_le()),
                other => {
                    return Err(ThinError::Serialization(format!(
                        "unsupported float width {} for {}",
                        other, desc.name
                    )))
                }
            };
            Ok((value, pos))
        }
        ParsingStrategy::RawBytes => {
            let len = read_len(buf, pos, "byte array length")?;
            pos += 4;
            let raw = take(buf, pos, len, desc.name)?;
            pos += len;
            Ok((Value::Bytes(raw.to_vec()), pos))
        }
        ParsingStrategy::UuidBytes => {
            let size = desc.fixed_size.unwrap_or(16);
            let raw = take(buf, pos, size, desc.name)?;
            pos += size;
            let uuid = Uuid::from_slice(raw)
                .map_err(|e| ThinError::Serialization(format!("invalid uuid: {}", e)))?;
            Ok((Value::Uuid(uuid), pos))
        }
    }
}

// =============================================================================
// Buffer Helpers
// =============================================================================

/// Borrow `len` bytes at `pos`, or fail without advancing
fn take<'a>(buf: &'a [u8], pos: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| ThinError::truncated(what, pos, len, buf.len().saturating_sub(pos)))?;
    Ok(&buf[pos..end])
}

/// Refuse to open another container once `depth` reaches the limit
pub(crate) fn check_depth(depth: usize, offset: usize) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(ThinError::Serialization(format!(
            "containers nested deeper than {} at offset {}",
            MAX_NESTING_DEPTH, offset
        )));
    }
    Ok(())
}

/// Read a 4-byte little-endian length; negative lengths are rejected
fn read_len(buf: &[u8], pos: usize, what: &str) -> Result<usize> {
    let mut raw = take(buf, pos, 4, what)?;
    let len = raw.get_i32_le();
    usize::try_from(len)
        .map_err(|_| ThinError::Serialization(format!("negative {} {} at offset {}", what, len, pos)))
}
