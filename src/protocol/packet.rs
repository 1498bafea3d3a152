//! Packet format table
//!
//! Declarative per-operation schema: op code, request fields, response fields,
//! and the routes that extend the response field queue based on a value
//! decoded earlier in the same response.

use crate::error::{Result, ThinError};

/// One field of a request or response layout
///
/// The variant decides the wire width; the name (see [`FieldSpec::name`]) is
/// the key used in field maps and route tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// Constant bytes copied verbatim
    Literal(&'static [u8]),
    /// 2-byte op code
    OpCode,
    /// 8-byte request id
    RequestId,
    /// 4-byte Java hash code of the cache name
    CacheId,
    /// Single flags byte (always zero in requests)
    Flags,
    /// 2-byte handshake version component (1 = major, 2 = minor, 3 = patch)
    VersionNumber(u8),
    /// Binary object; in responses it takes every remaining byte of the frame
    BinaryObject(&'static str),
    /// 4-byte count of a binary object batch
    BinaryObjectCount,
    /// Concatenated binary objects (requests only)
    BinaryObjects,
    /// 4-byte response status
    Status,
    /// 1-byte handshake outcome
    Success,
    /// Named 1-byte integer
    Byte(&'static str),
    /// Named 4-byte integer
    Int(&'static str),
    /// Named 8-byte integer
    Long(&'static str),
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        match self {
            FieldSpec::Literal(_) => "literal",
            FieldSpec::OpCode => "op_code",
            FieldSpec::RequestId => "request_id",
            FieldSpec::CacheId => "cache_id",
            FieldSpec::Flags => "flags",
            FieldSpec::VersionNumber(1) => "version_number_1",
            FieldSpec::VersionNumber(2) => "version_number_2",
            FieldSpec::VersionNumber(3) => "version_number_3",
            FieldSpec::VersionNumber(_) => "version_number",
            FieldSpec::BinaryObject(name) => name,
            FieldSpec::BinaryObjectCount => "binary_object_count",
            FieldSpec::BinaryObjects => "binary_objects",
            FieldSpec::Status => "status",
            FieldSpec::Success => "success",
            FieldSpec::Byte(name) | FieldSpec::Int(name) | FieldSpec::Long(name) => name,
        }
    }
}

/// Route key used when no branch matches the decoded value exactly
pub const FALLBACK: i64 = -1;

/// Conditional continuation keyed by a decoded field's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Name of the field whose value selects the branch
    pub field: &'static str,

    /// `(value, fields appended to the queue)`; key [`FALLBACK`] catches the rest
    pub branches: &'static [(i64, &'static [FieldSpec])],
}

impl Route {
    /// Fields to append for `value`: the exact branch, else the fallback
    pub fn select(&self, value: i64) -> Option<&'static [FieldSpec]> {
        let exact = self.branches.iter().find(|(key, _)| *key == value);
        exact
            .or_else(|| self.branches.iter().find(|(key, _)| *key == FALLBACK))
            .map(|(_, fields)| *fields)
    }
}

/// Request/response layout for one mode of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub request: &'static [FieldSpec],
    pub response: &'static [FieldSpec],
    pub routes: &'static [Route],
}

impl PacketLayout {
    pub fn route_for(&self, field: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.field == field)
    }
}

/// Layout selector (only the handshake has an authenticated variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Plain,
    Auth,
}

/// Full schema of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSpec {
    pub name: &'static str,
    pub op_code: i16,
    pub plain: PacketLayout,
    pub auth: Option<PacketLayout>,
}

impl PacketSpec {
    pub fn layout(&self, mode: Mode) -> Result<&PacketLayout> {
        match mode {
            Mode::Plain => Ok(&self.plain),
            Mode::Auth => self.auth.as_ref().ok_or_else(|| {
                ThinError::Protocol(format!("{} has no authenticated layout", self.name))
            }),
        }
    }
}

// =============================================================================
// Shared Field Lists
// =============================================================================

const NO_FIELDS: &[FieldSpec] = &[];
const ERROR_PAYLOAD: &[FieldSpec] = &[FieldSpec::BinaryObject("binary_object")];
const BOOL_RESULT: &[FieldSpec] = &[FieldSpec::Byte("bool")];
const LONG_RESULT: &[FieldSpec] = &[FieldSpec::Long("long")];
const BATCH_RESULT: &[FieldSpec] = &[FieldSpec::BinaryObjectCount, FieldSpec::BinaryObject("binary_object")];
const SCAN_RESULT: &[FieldSpec] = &[
    FieldSpec::Long("cursor_id"),
    FieldSpec::BinaryObjectCount,
    FieldSpec::BinaryObject("binary_object"),
];

const STATUS_RESPONSE: &[FieldSpec] = &[FieldSpec::RequestId, FieldSpec::Status];
const STATUS_OBJECT_RESPONSE: &[FieldSpec] =
    &[FieldSpec::RequestId, FieldSpec::Status, FieldSpec::BinaryObject("binary_object")];

// Status 0 continues with the operation's result; anything else carries an
// error message object.
const STATUS_ONLY: &[Route] = &[Route {
    field: "status",
    branches: &[(0, NO_FIELDS), (FALLBACK, ERROR_PAYLOAD)],
}];
const STATUS_BOOL: &[Route] = &[Route {
    field: "status",
    branches: &[(0, BOOL_RESULT), (FALLBACK, ERROR_PAYLOAD)],
}];
const STATUS_LONG: &[Route] = &[Route {
    field: "status",
    branches: &[(0, LONG_RESULT), (FALLBACK, ERROR_PAYLOAD)],
}];
const STATUS_BATCH: &[Route] = &[Route {
    field: "status",
    branches: &[(0, BATCH_RESULT), (FALLBACK, ERROR_PAYLOAD)],
}];
const STATUS_SCAN: &[Route] = &[Route {
    field: "status",
    branches: &[(0, SCAN_RESULT), (FALLBACK, ERROR_PAYLOAD)],
}];

const fn status_layout(request: &'static [FieldSpec], routes: &'static [Route]) -> PacketLayout {
    PacketLayout {
        request,
        response: STATUS_RESPONSE,
        routes,
    }
}

// =============================================================================
// Handshake
// =============================================================================

const HANDSHAKE_REQUEST: &[FieldSpec] = &[
    FieldSpec::Literal(&[1]),
    FieldSpec::VersionNumber(1),
    FieldSpec::VersionNumber(2),
    FieldSpec::VersionNumber(3),
    FieldSpec::Literal(&[2]),
];

const HANDSHAKE_AUTH_REQUEST: &[FieldSpec] = &[
    FieldSpec::Literal(&[1]),
    FieldSpec::VersionNumber(1),
    FieldSpec::VersionNumber(2),
    FieldSpec::VersionNumber(3),
    FieldSpec::Literal(&[2]),
    FieldSpec::BinaryObject("binary_object_username"),
    FieldSpec::BinaryObject("binary_object_password"),
];

const HANDSHAKE_REJECTED: &[FieldSpec] = &[
    FieldSpec::VersionNumber(1),
    FieldSpec::VersionNumber(2),
    FieldSpec::VersionNumber(3),
    FieldSpec::BinaryObject("binary_object"),
];

const HANDSHAKE_ROUTES: &[Route] = &[Route {
    field: "success",
    branches: &[(0, HANDSHAKE_REJECTED), (1, NO_FIELDS)],
}];

pub const HANDSHAKE: PacketSpec = PacketSpec {
    name: "handshake",
    op_code: -1,
    plain: PacketLayout {
        request: HANDSHAKE_REQUEST,
        response: &[FieldSpec::Success],
        routes: HANDSHAKE_ROUTES,
    },
    auth: Some(PacketLayout {
        request: HANDSHAKE_AUTH_REQUEST,
        response: &[FieldSpec::Success],
        routes: HANDSHAKE_ROUTES,
    }),
};

// =============================================================================
// Cache Operations
// =============================================================================

const KEY: FieldSpec = FieldSpec::BinaryObject("binary_object_key");
const VALUE: FieldSpec = FieldSpec::BinaryObject("binary_object_value");

const CACHE_HEADER: &[FieldSpec] = &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::CacheId, FieldSpec::Flags];
const CACHE_KEY: &[FieldSpec] = &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::CacheId, FieldSpec::Flags, KEY];
const CACHE_KEY_VALUE: &[FieldSpec] =
    &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::CacheId, FieldSpec::Flags, KEY, VALUE];
const CACHE_BATCH: &[FieldSpec] = &[
    FieldSpec::OpCode,
    FieldSpec::RequestId,
    FieldSpec::CacheId,
    FieldSpec::Flags,
    FieldSpec::BinaryObjectCount,
    FieldSpec::BinaryObjects,
];

const fn plain(name: &'static str, op_code: i16, layout: PacketLayout) -> PacketSpec {
    PacketSpec {
        name,
        op_code,
        plain: layout,
        auth: None,
    }
}

pub const OP_CACHE_GET: PacketSpec = plain(
    "OP_CACHE_GET",
    1000,
    PacketLayout {
        request: CACHE_KEY,
        response: STATUS_OBJECT_RESPONSE,
        routes: &[],
    },
);

pub const OP_CACHE_PUT: PacketSpec = plain("OP_CACHE_PUT", 1001, status_layout(CACHE_KEY_VALUE, STATUS_ONLY));

pub const OP_CACHE_GET_ALL: PacketSpec = plain("OP_CACHE_GET_ALL", 1003, status_layout(CACHE_BATCH, STATUS_BATCH));

pub const OP_CACHE_PUT_ALL: PacketSpec = plain("OP_CACHE_PUT_ALL", 1004, status_layout(CACHE_BATCH, STATUS_ONLY));

pub const OP_CACHE_CONTAINS_KEY: PacketSpec =
    plain("OP_CACHE_CONTAINS_KEY", 1011, status_layout(CACHE_KEY, STATUS_BOOL));

pub const OP_CACHE_CONTAINS_KEYS: PacketSpec =
    plain("OP_CACHE_CONTAINS_KEYS", 1012, status_layout(CACHE_BATCH, STATUS_BOOL));

pub const OP_CACHE_CLEAR: PacketSpec = plain("OP_CACHE_CLEAR", 1013, status_layout(CACHE_HEADER, STATUS_ONLY));

pub const OP_CACHE_CLEAR_KEY: PacketSpec = plain("OP_CACHE_CLEAR_KEY", 1014, status_layout(CACHE_KEY, STATUS_ONLY));

pub const OP_CACHE_REMOVE_KEY: PacketSpec =
    plain("OP_CACHE_REMOVE_KEY", 1016, status_layout(CACHE_KEY, STATUS_BOOL));

pub const OP_CACHE_REMOVE_ALL: PacketSpec =
    plain("OP_CACHE_REMOVE_ALL", 1019, status_layout(CACHE_HEADER, STATUS_ONLY));

pub const OP_CACHE_GET_SIZE: PacketSpec = plain(
    "OP_CACHE_GET_SIZE",
    1020,
    status_layout(
        &[
            FieldSpec::OpCode,
            FieldSpec::RequestId,
            FieldSpec::CacheId,
            FieldSpec::Flags,
            // Peek mode count: zero means all modes
            FieldSpec::Literal(&[0, 0, 0, 0]),
        ],
        STATUS_LONG,
    ),
);

pub const OP_CACHE_GET_NAMES: PacketSpec = plain(
    "OP_CACHE_GET_NAMES",
    1050,
    PacketLayout {
        request: &[FieldSpec::OpCode, FieldSpec::RequestId],
        response: STATUS_OBJECT_RESPONSE,
        routes: &[],
    },
);

pub const OP_CACHE_CREATE_WITH_NAME: PacketSpec = plain(
    "OP_CACHE_CREATE_WITH_NAME",
    1051,
    status_layout(
        &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::BinaryObject("binary_object")],
        STATUS_ONLY,
    ),
);

pub const OP_CACHE_DESTROY: PacketSpec = plain(
    "OP_CACHE_DESTROY",
    1056,
    status_layout(&[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::CacheId], STATUS_ONLY),
);

// =============================================================================
// Queries and Resources
// =============================================================================

pub const OP_QUERY_SCAN: PacketSpec = plain(
    "OP_QUERY_SCAN",
    2000,
    status_layout(
        &[
            FieldSpec::OpCode,
            FieldSpec::RequestId,
            FieldSpec::CacheId,
            FieldSpec::Flags,
            FieldSpec::BinaryObject("binary_object_filter"),
            FieldSpec::Byte("filter_platform"),
            FieldSpec::Int("cursor_page_size"),
            FieldSpec::Int("partition"),
            FieldSpec::Byte("local"),
        ],
        STATUS_SCAN,
    ),
);

pub const OP_QUERY_SCAN_CURSOR_GET_PAGE: PacketSpec = plain(
    "OP_QUERY_SCAN_CURSOR_GET_PAGE",
    2001,
    status_layout(
        &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::Long("cursor_id")],
        STATUS_BATCH,
    ),
);

pub const OP_RESOURCE_CLOSE: PacketSpec = plain(
    "OP_RESOURCE_CLOSE",
    0,
    status_layout(
        &[FieldSpec::OpCode, FieldSpec::RequestId, FieldSpec::Long("resource_id")],
        STATUS_ONLY,
    ),
);

/// Every known operation
pub static PACKETS: &[PacketSpec] = &[
    HANDSHAKE,
    OP_CACHE_GET,
    OP_CACHE_PUT,
    OP_CACHE_GET_ALL,
    OP_CACHE_PUT_ALL,
    OP_CACHE_CONTAINS_KEY,
    OP_CACHE_CONTAINS_KEYS,
    OP_CACHE_CLEAR,
    OP_CACHE_CLEAR_KEY,
    OP_CACHE_REMOVE_KEY,
    OP_CACHE_REMOVE_ALL,
    OP_CACHE_GET_SIZE,
    OP_CACHE_GET_NAMES,
    OP_CACHE_CREATE_WITH_NAME,
    OP_CACHE_DESTROY,
    OP_QUERY_SCAN,
    OP_QUERY_SCAN_CURSOR_GET_PAGE,
    OP_RESOURCE_CLOSE,
];

/// Look up an operation by name
pub fn packet_spec(name: &str) -> Result<&'static PacketSpec> {
    PACKETS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| ThinError::UnknownOperation(name.to_string()))
}
