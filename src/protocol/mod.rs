//! Protocol Module
//!
//! Wire protocol for talking to a data-grid node over its thin client port.
//!
//! ## Protocol Format
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────────────────────┐
//! │ Len (4)  │ Op (2)   │ Req. Id (8)  │ Operation fields         │
//! └──────────┴──────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────────┬────────────┬────────────────────────┐
//! │ Len (4)  │ Req. Id (8)  │ Status (4) │ Result or error object │
//! └──────────┴──────────────┴────────────┴────────────────────────┘
//! ```
//!
//! ### Handshake
//! - Request: `1`, major (2), minor (2), patch (2), `2`, then optional
//!   username and password strings
//! - Response: success (1); on failure the server's version triple and an
//!   error string follow
//!
//! Field layouts live in the [`packet`] table; [`codec`] interprets them.

pub mod codec;
mod command;
pub mod packet;
mod request;
mod response;

pub use codec::{
    build_request, cache_id, check_status, decode_fields, java_hash_code, parse_response,
};
pub use command::{Command, TypedValue, DEFAULT_PAGE_SIZE};
pub use packet::{packet_spec, FieldSpec, Mode, PacketLayout, PacketSpec, Route, FALLBACK};
pub use request::{BinaryObjects, RequestFields};
pub use response::{Reply, ResponseField, ResponseFields, ScanPage};
