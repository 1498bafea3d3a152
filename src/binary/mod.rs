//! Binary Object Module
//!
//! Self-describing, type-tagged value encoding used for every key, value and
//! object field carried by the wire protocol.
//!
//! ## Entry Format
//! ```text
//! ┌──────────┬─────────────────────────────────────────┐
//! │ Code (1) │ Payload (depends on the type code)      │
//! └──────────┴─────────────────────────────────────────┘
//! ```
//!
//! ### Payloads
//! - Fixed-width scalars: little-endian bytes (byte, short, int, long,
//!   float, double, bool, uuid, date)
//! - string: len (4) + UTF-8 bytes
//! - char: 2 bytes, zero-padded on the left
//! - byte array: len (4) + raw bytes
//! - typed arrays (short..bool): count (4) + elements WITHOUT type codes
//! - string/uuid/date arrays: count (4) + elements WITH type codes
//! - object array: type id (4) + count (4) + elements WITH type codes
//! - map: count (4) + subtype (1) + key/value entries WITH type codes
//! - null: no payload
//!
//! All integers are little-endian. Containers nest at most
//! [`MAX_NESTING_DEPTH`] levels deep.

mod decode;
mod encode;
pub mod types;
mod value;

pub use decode::{
    decode_entries, decode_entry, deserialize, deserialize_traced, skip_entries, DecodeObserver,
    TypeTrace, MAX_NESTING_DEPTH,
};
pub use encode::{encode_entry, encode_into, serialize};
pub use types::{describe, lookup, BinaryType, Layout, ParsingStrategy, TypeDescriptor};
pub use value::{Value, ValueMap};
