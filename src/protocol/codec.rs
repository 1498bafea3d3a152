//! Protocol codec
//!
//! Table-driven request building and response parsing.
//!
//! ## Wire Format
//!
//! ### Frame
//! ```text
//! ┌───────────┬──────────────────────────────────────┐
//! │ Len (4)   │ Payload (Len bytes)                  │
//! └───────────┴──────────────────────────────────────┘
//! ```
//!
//! ### Request Payload (cache operations)
//! ```text
//! ┌──────────┬──────────────┬─────────────┬──────────┬──────────────┐
//! │ Op (2)   │ Req. Id (8)  │ Cache Id(4) │ Flags(1) │ Operands...  │
//! └──────────┴──────────────┴─────────────┴──────────┴──────────────┘
//! ```
//!
//! ### Response Payload
//! ```text
//! ┌──────────────┬────────────┬─────────────────────────────────────┐
//! │ Req. Id (8)  │ Status (4) │ Routed fields (result or error msg) │
//! └──────────────┴────────────┴─────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes};

use crate::binary::{self, Value};
use crate::error::{Result, ThinError};

use super::packet::{FieldSpec, Mode, PacketSpec};
use super::request::{BinaryObjects, RequestFields};
use super::response::{ResponseField, ResponseFields};

/// Length prefix size
pub const LENGTH_PREFIX: usize = 4;

/// Java `String.hashCode` over UTF-16 code units
///
/// The server identifies caches by this hash of their name.
pub fn java_hash_code(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Cache id for a cache name
pub fn cache_id(name: &str) -> i32 {
    java_hash_code(name)
}

// =============================================================================
// Request Building
// =============================================================================

/// Build a complete request frame (length prefix included)
pub fn build_request(
    spec: &PacketSpec,
    mode: Mode,
    request_id: u64,
    fields: &RequestFields,
) -> Result<Vec<u8>> {
    let layout = spec.layout(mode)?;

    let mut frame = Vec::with_capacity(64);
    frame.put_i32_le(0);
    for field in layout.request {
        encode_field(spec, field, request_id, fields, &mut frame)?;
    }

    let payload_len = i32::try_from(frame.len() - LENGTH_PREFIX).map_err(|_| {
        ThinError::Protocol(format!("{} request too large: {} bytes", spec.name, frame.len()))
    })?;
    frame[..LENGTH_PREFIX].copy_from_slice(&payload_len.to_le_bytes());
    Ok(frame)
}

fn encode_field(
    spec: &PacketSpec,
    field: &FieldSpec,
    request_id: u64,
    fields: &RequestFields,
    out: &mut Vec<u8>,
) -> Result<()> {
    match *field {
        FieldSpec::Literal(bytes) => out.put_slice(bytes),
        FieldSpec::OpCode => out.put_i16_le(spec.op_code),
        FieldSpec::RequestId => out.put_u64_le(request_id),
        FieldSpec::CacheId => {
            let name = fields
                .cache_name()
                .ok_or_else(|| ThinError::MissingField("cache".to_string()))?;
            out.put_i32_le(cache_id(name));
        }
        FieldSpec::Flags => out.put_u8(0),
        FieldSpec::VersionNumber(_) => {
            let n = integer_field(field.name(), fields, 0, u16::MAX as i64)?;
            out.put_u16_le(n as u16);
        }
        FieldSpec::BinaryObject(name) => {
            let value = fields
                .get(name)
                .ok_or_else(|| ThinError::MissingField(name.to_string()))?;
            binary::encode_into(value, fields.type_override(name), out)?;
        }
        FieldSpec::BinaryObjectCount => {
            let count = match (fields.get(field.name()), fields.batch()) {
                (Some(_), _) => integer_field(field.name(), fields, 0, i32::MAX as i64)?,
                (None, Some(batch)) => batch.len() as i64,
                (None, None) => return Err(ThinError::MissingField(field.name().to_string())),
            };
            let count = i32::try_from(count).map_err(|_| {
                ThinError::Protocol(format!("{} batch too large: {}", spec.name, count))
            })?;
            out.put_i32_le(count);
        }
        FieldSpec::BinaryObjects => {
            let batch = fields
                .batch()
                .ok_or_else(|| ThinError::MissingField(field.name().to_string()))?;
            match batch {
                BinaryObjects::List(items) => {
                    for item in items {
                        binary::encode_into(item, None, out)?;
                    }
                }
                BinaryObjects::Pairs(pairs) => {
                    for (key, value) in pairs {
                        binary::encode_into(key, None, out)?;
                        binary::encode_into(value, None, out)?;
                    }
                }
            }
        }
        FieldSpec::Byte(name) => {
            let n = integer_field(name, fields, i8::MIN as i64, u8::MAX as i64)?;
            out.put_u8(n as u8);
        }
        FieldSpec::Int(name) => {
            let n = integer_field(name, fields, i32::MIN as i64, i32::MAX as i64)?;
            out.put_i32_le(n as i32);
        }
        FieldSpec::Long(name) => {
            let n = integer_field(name, fields, i64::MIN, i64::MAX)?;
            out.put_i64_le(n);
        }
        FieldSpec::Status | FieldSpec::Success => {
            return Err(ThinError::Protocol(format!(
                "{}: {} is a response-only field",
                spec.name,
                field.name()
            )))
        }
    }
    Ok(())
}

/// Integer (or boolean) request field within `min..=max`
fn integer_field(name: &str, fields: &RequestFields, min: i64, max: i64) -> Result<i64> {
    let value = fields
        .get(name)
        .ok_or_else(|| ThinError::MissingField(name.to_string()))?;
    let n = match value {
        Value::Bool(flag) => *flag as i64,
        other => other.as_i64().ok_or_else(|| ThinError::TypeMismatch {
            type_name: "integer field",
            value: format!("{} = {}", name, other),
        })?,
    };
    if !(min..=max).contains(&n) {
        return Err(ThinError::TypeMismatch {
            type_name: "integer field",
            value: format!("{} = {} out of range", name, n),
        });
    }
    Ok(n)
}

// =============================================================================
// Response Parsing
// =============================================================================

/// Decode a response frame into named fields
///
/// Fields are consumed from a worklist seeded with the layout's response
/// fields; each decoded field with a route appends the selected branch. A
/// binary object field takes every remaining byte of the frame. Bytes past
/// the last field are legal (newer servers append fields older layouts don't
/// name); they are skipped and logged at `debug`.
pub fn decode_fields(spec: &PacketSpec, mode: Mode, frame: &[u8]) -> Result<ResponseFields> {
    let layout = spec.layout(mode)?;
    let payload = frame_payload(frame)?;

    let mut cursor = payload;
    let mut queue: VecDeque<FieldSpec> = layout.response.iter().copied().collect();
    let mut fields = ResponseFields::new();

    while let Some(field) = queue.pop_front() {
        let offset = payload.len() - cursor.len();
        let value = match field {
            FieldSpec::Literal(bytes) => {
                need(cursor.len(), bytes.len(), field, offset)?;
                cursor.advance(bytes.len());
                continue;
            }
            FieldSpec::BinaryObject(_) | FieldSpec::BinaryObjects => {
                let object = Bytes::copy_from_slice(cursor);
                cursor = &cursor[cursor.len()..];
                ResponseField::Object(object)
            }
            FieldSpec::Flags | FieldSpec::Success | FieldSpec::Byte(_) => {
                need(cursor.len(), 1, field, offset)?;
                ResponseField::Int(cursor.get_u8() as i64)
            }
            FieldSpec::OpCode => {
                need(cursor.len(), 2, field, offset)?;
                ResponseField::Int(cursor.get_i16_le() as i64)
            }
            FieldSpec::VersionNumber(_) => {
                need(cursor.len(), 2, field, offset)?;
                ResponseField::Int(cursor.get_u16_le() as i64)
            }
            FieldSpec::CacheId | FieldSpec::Status | FieldSpec::BinaryObjectCount | FieldSpec::Int(_) => {
                need(cursor.len(), 4, field, offset)?;
                ResponseField::Int(cursor.get_i32_le() as i64)
            }
            FieldSpec::RequestId => {
                need(cursor.len(), 8, field, offset)?;
                ResponseField::Int(cursor.get_u64_le() as i64)
            }
            FieldSpec::Long(_) => {
                need(cursor.len(), 8, field, offset)?;
                ResponseField::Int(cursor.get_i64_le())
            }
        };

        let name = field.name();
        if let Some(route) = layout.route_for(name) {
            let key = match value {
                ResponseField::Int(n) => n,
                ResponseField::Object(_) => {
                    return Err(ThinError::Protocol(format!(
                        "{}: cannot route on binary object field {}",
                        spec.name, name
                    )))
                }
            };
            let branch = route.select(key).ok_or_else(|| {
                ThinError::Protocol(format!("{}: unexpected {} value {}", spec.name, name, key))
            })?;
            queue.extend(branch.iter().copied());
        }
        fields.insert(name, value);
    }

    if !cursor.is_empty() {
        tracing::debug!(operation = spec.name, trailing = cursor.len(), "Skipping trailing response bytes");
    }
    Ok(fields)
}

/// Decode a response frame and fail on a nonzero status
pub fn parse_response(spec: &PacketSpec, mode: Mode, frame: &[u8]) -> Result<ResponseFields> {
    let fields = decode_fields(spec, mode, frame)?;
    check_status(spec, &fields)?;
    Ok(fields)
}

/// Turn a nonzero `status` into a remote operation error
pub fn check_status(spec: &PacketSpec, fields: &ResponseFields) -> Result<()> {
    match fields.status() {
        Some(0) | None => Ok(()),
        Some(status) => Err(ThinError::RemoteOperation {
            operation: spec.name,
            status,
            message: error_message(fields).unwrap_or_else(|| format!("status {}", status)),
        }),
    }
}

/// Server-supplied error text carried in the `binary_object` field
pub(crate) fn error_message(fields: &ResponseFields) -> Option<String> {
    let raw = fields.object("binary_object")?;
    if raw.is_empty() {
        return None;
    }
    match binary::deserialize(raw) {
        Ok(Value::String(message)) => Some(message),
        Ok(Value::Null) => None,
        Ok(other) => Some(other.to_string()),
        Err(_) => Some(String::from_utf8_lossy(raw).into_owned()),
    }
}

/// Payload of a complete frame, length-checked against the prefix
fn frame_payload(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < LENGTH_PREFIX {
        return Err(ThinError::truncated("frame length", 0, LENGTH_PREFIX, frame.len()));
    }
    let declared = (&frame[..LENGTH_PREFIX]).get_i32_le();
    let declared = usize::try_from(declared)
        .map_err(|_| ThinError::Serialization(format!("negative frame length {}", declared)))?;

    let end = LENGTH_PREFIX + declared;
    if frame.len() < end {
        return Err(ThinError::truncated("frame", LENGTH_PREFIX, declared, frame.len() - LENGTH_PREFIX));
    }
    Ok(&frame[LENGTH_PREFIX..end])
}

fn need(remaining: usize, len: usize, field: FieldSpec, offset: usize) -> Result<()> {
    if remaining < len {
        return Err(ThinError::truncated(field.name(), offset, len, remaining));
    }
    Ok(())
}
