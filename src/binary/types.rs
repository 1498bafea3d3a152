//! Type registry
//!
//! Static table of every logical type the codec understands: its one-byte wire
//! code, fixed size, and how its payload is laid out.
//!
//! ## Name Resolution
//! Several logical names share a wire code: a Rust-native alias (what a
//! [`Value`] variant encodes as by default) and the protocol-native name
//! (`long`, `string`, `map`, ...). The registry keeps two tables:
//! - by name: unambiguous, every name maps to exactly one type
//! - by code: when names alias, the Rust-native alias wins
//!
//! The wire byte is identical either way; the priority only decides which
//! descriptor drives decoding.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Result, ThinError};

use super::Value;

/// How a scalar payload is read and written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsingStrategy {
    /// Little-endian two's-complement integer of `fixed_size` bytes
    IntLe,
    /// IEEE float, 4 or 8 bytes little-endian
    FloatLe,
    /// UTF-8 text, length-prefixed unless `skip_length_header`
    Utf8,
    /// Length-prefixed raw bytes
    RawBytes,
    /// 16 raw UUID bytes
    UuidBytes,
}

/// Payload shape of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No payload after the type code
    Null,
    Scalar(ParsingStrategy),
    /// Count-prefixed sequence of elements
    Array,
    /// Count-prefixed key/value pairs
    Map,
    /// Complex object (class) - not supported
    Object,
}

/// One registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Logical name
    pub name: &'static str,

    /// One-byte wire code
    pub code: u8,

    pub layout: Layout,

    /// Payload size for fixed-width scalars
    pub fixed_size: Option<usize>,

    /// Raw byte <-> boolean mapping (bool cells)
    pub value_map: Option<&'static [(u8, bool)]>,

    /// Element type code of homogeneous arrays (not repeated per element)
    pub item_code: Option<u8>,

    /// Each element carries its own type code
    pub includes_item_type_code: bool,

    /// A 4-byte element type id precedes the element count
    pub has_type_id: bool,

    /// Text cell without a length prefix
    pub skip_length_header: bool,

    /// Text cell zero-padded (on the left) to this width
    pub zero_pad_width: Option<usize>,
}

impl TypeDescriptor {
    const fn base(name: &'static str, code: u8, layout: Layout) -> Self {
        Self {
            name,
            code,
            layout,
            fixed_size: None,
            value_map: None,
            item_code: None,
            includes_item_type_code: false,
            has_type_id: false,
            skip_length_header: false,
            zero_pad_width: None,
        }
    }

    const fn fixed(name: &'static str, code: u8, strategy: ParsingStrategy, size: usize) -> Self {
        let mut desc = Self::base(name, code, Layout::Scalar(strategy));
        desc.fixed_size = Some(size);
        desc
    }

    const fn text(name: &'static str, code: u8) -> Self {
        Self::base(name, code, Layout::Scalar(ParsingStrategy::Utf8))
    }

    const fn char_cell(name: &'static str, code: u8) -> Self {
        let mut desc = Self::text(name, code);
        desc.fixed_size = Some(2);
        desc.skip_length_header = true;
        desc.zero_pad_width = Some(2);
        desc
    }

    const fn boolean(name: &'static str, code: u8) -> Self {
        let mut desc = Self::fixed(name, code, ParsingStrategy::IntLe, 1);
        desc.value_map = Some(BOOL_VALUES);
        desc
    }

    const fn raw(name: &'static str, code: u8) -> Self {
        Self::base(name, code, Layout::Scalar(ParsingStrategy::RawBytes))
    }

    const fn typed_array(name: &'static str, code: u8, item_code: u8) -> Self {
        let mut desc = Self::base(name, code, Layout::Array);
        desc.item_code = Some(item_code);
        desc
    }

    const fn inline_array(name: &'static str, code: u8) -> Self {
        let mut desc = Self::base(name, code, Layout::Array);
        desc.includes_item_type_code = true;
        desc
    }

    const fn object_array(name: &'static str, code: u8) -> Self {
        let mut desc = Self::inline_array(name, code);
        desc.has_type_id = true;
        desc
    }

    const fn map(name: &'static str, code: u8) -> Self {
        let mut desc = Self::base(name, code, Layout::Map);
        desc.includes_item_type_code = true;
        desc
    }

    /// Scalar parsing strategy, if the type is a scalar
    pub fn parsing_strategy(&self) -> Option<ParsingStrategy> {
        match self.layout {
            Layout::Scalar(strategy) => Some(strategy),
            _ => None,
        }
    }
}

const BOOL_VALUES: &[(u8, bool)] = &[(1, true), (0, false)];

/// Element type id written before object-array elements (`java.lang.Object`)
pub const OBJECT_ARRAY_TYPE_ID: i32 = -1;

/// Subtype byte written after a map's pair count (hash map)
pub const MAP_SUBTYPE: u8 = 1;

// =============================================================================
// Logical Types
// =============================================================================

/// Every logical type name known to the registry
///
/// Declaration order is resolution priority for shared codes: the Rust-native
/// aliases come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryType {
    // Rust-native aliases (default encodings of Value variants)
    NativeLong,
    NativeDouble,
    NativeBool,
    NativeString,
    NativeUuid,
    NativeBytes,
    NativeList,
    NativeMap,
    NativeNull,
    NativeStruct,

    // Protocol-native names
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Bool,
    String,
    Uuid,
    Date,
    ByteArray,
    ShortArray,
    IntArray,
    LongArray,
    FloatArray,
    DoubleArray,
    CharArray,
    BoolArray,
    StringArray,
    UuidArray,
    DateArray,
    ObjectArray,
    Map,
    Null,
    Object,
}

/// Descriptors indexed by `BinaryType as usize`
static DESCRIPTORS: [TypeDescriptor; 36] = {
    use ParsingStrategy::*;
    [
        TypeDescriptor::fixed("rust.i64", 4, IntLe, 8),
        TypeDescriptor::fixed("rust.f64", 6, FloatLe, 8),
        TypeDescriptor::boolean("rust.bool", 8),
        TypeDescriptor::text("rust.String", 9),
        TypeDescriptor::fixed("rust.Uuid", 10, UuidBytes, 16),
        TypeDescriptor::raw("rust.bytes", 12),
        TypeDescriptor::object_array("rust.Vec", 23),
        TypeDescriptor::map("rust.Map", 25),
        TypeDescriptor::base("rust.None", 101, Layout::Null),
        TypeDescriptor::base("rust.struct", 103, Layout::Object),
        TypeDescriptor::fixed("byte", 1, IntLe, 1),
        TypeDescriptor::fixed("short", 2, IntLe, 2),
        TypeDescriptor::fixed("int", 3, IntLe, 4),
        TypeDescriptor::fixed("long", 4, IntLe, 8),
        TypeDescriptor::fixed("float", 5, FloatLe, 4),
        TypeDescriptor::fixed("double", 6, FloatLe, 8),
        TypeDescriptor::char_cell("char", 7),
        TypeDescriptor::boolean("bool", 8),
        TypeDescriptor::text("string", 9),
        TypeDescriptor::fixed("uuid", 10, UuidBytes, 16),
        TypeDescriptor::fixed("date", 11, IntLe, 8),
        TypeDescriptor::raw("array.byte", 12),
        TypeDescriptor::typed_array("array.short", 13, 2),
        TypeDescriptor::typed_array("array.int", 14, 3),
        TypeDescriptor::typed_array("array.long", 15, 4),
        TypeDescriptor::typed_array("array.float", 16, 5),
        TypeDescriptor::typed_array("array.double", 17, 6),
        TypeDescriptor::typed_array("array.char", 18, 7),
        TypeDescriptor::typed_array("array.bool", 19, 8),
        TypeDescriptor::inline_array("array.string", 20),
        TypeDescriptor::inline_array("array.uuid", 21),
        TypeDescriptor::inline_array("array.date", 22),
        TypeDescriptor::object_array("array.object", 23),
        TypeDescriptor::map("map", 25),
        TypeDescriptor::base("null", 101, Layout::Null),
        TypeDescriptor::base("object", 103, Layout::Object),
    ]
};

impl BinaryType {
    /// All types in resolution priority order
    pub const ALL: [BinaryType; 36] = [
        BinaryType::NativeLong,
        BinaryType::NativeDouble,
        BinaryType::NativeBool,
        BinaryType::NativeString,
        BinaryType::NativeUuid,
        BinaryType::NativeBytes,
        BinaryType::NativeList,
        BinaryType::NativeMap,
        BinaryType::NativeNull,
        BinaryType::NativeStruct,
        BinaryType::Byte,
        BinaryType::Short,
        BinaryType::Int,
        BinaryType::Long,
        BinaryType::Float,
        BinaryType::Double,
        BinaryType::Char,
        BinaryType::Bool,
        BinaryType::String,
        BinaryType::Uuid,
        BinaryType::Date,
        BinaryType::ByteArray,
        BinaryType::ShortArray,
        BinaryType::IntArray,
        BinaryType::LongArray,
        BinaryType::FloatArray,
        BinaryType::DoubleArray,
        BinaryType::CharArray,
        BinaryType::BoolArray,
        BinaryType::StringArray,
        BinaryType::UuidArray,
        BinaryType::DateArray,
        BinaryType::ObjectArray,
        BinaryType::Map,
        BinaryType::Null,
        BinaryType::Object,
    ];

    pub fn descriptor(self) -> &'static TypeDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn code(self) -> u8 {
        self.descriptor().code
    }

    pub fn is_native(self) -> bool {
        self.name().starts_with("rust.")
    }

    /// Element type forced onto the members of a typed array
    ///
    /// `None` for heterogeneous containers, whose elements pick their own type.
    pub fn item_type(self) -> Option<BinaryType> {
        match self {
            BinaryType::ShortArray => Some(BinaryType::Short),
            BinaryType::IntArray => Some(BinaryType::Int),
            BinaryType::LongArray => Some(BinaryType::Long),
            BinaryType::FloatArray => Some(BinaryType::Float),
            BinaryType::DoubleArray => Some(BinaryType::Double),
            BinaryType::CharArray => Some(BinaryType::Char),
            BinaryType::BoolArray => Some(BinaryType::Bool),
            BinaryType::StringArray => Some(BinaryType::String),
            BinaryType::UuidArray => Some(BinaryType::Uuid),
            BinaryType::DateArray => Some(BinaryType::Date),
            _ => None,
        }
    }

    /// Default type for a value
    ///
    /// Widths the Rust-native aliases don't cover (i8, i16, i32, f32) map to
    /// their protocol-native names.
    pub fn infer(value: &Value) -> BinaryType {
        match value {
            Value::Null => BinaryType::NativeNull,
            Value::Bool(_) => BinaryType::NativeBool,
            Value::Byte(_) => BinaryType::Byte,
            Value::Short(_) => BinaryType::Short,
            Value::Int(_) => BinaryType::Int,
            Value::Long(_) => BinaryType::NativeLong,
            Value::Float(_) => BinaryType::Float,
            Value::Double(_) => BinaryType::NativeDouble,
            Value::String(_) => BinaryType::NativeString,
            Value::Uuid(_) => BinaryType::NativeUuid,
            Value::Bytes(_) => BinaryType::NativeBytes,
            Value::List(_) => BinaryType::NativeList,
            Value::Map(_) => BinaryType::NativeMap,
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BinaryType {
    type Err = ThinError;

    fn from_str(name: &str) -> Result<Self> {
        registry()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| ThinError::UnknownType(format!("no type named '{}'", name)))
    }
}

// =============================================================================
// Registry Tables
// =============================================================================

struct Registry {
    by_name: HashMap<&'static str, BinaryType>,
    by_code: HashMap<u8, BinaryType>,
}

impl Registry {
    fn build() -> Self {
        let mut by_name = HashMap::with_capacity(BinaryType::ALL.len());
        let mut by_code = HashMap::new();

        for ty in BinaryType::ALL {
            by_name.insert(ty.name(), ty);
            // First writer wins: ALL is in priority order
            by_code.entry(ty.code()).or_insert(ty);
        }

        Self { by_name, by_code }
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::build)
}

/// Resolve a wire code to its logical type (Rust-native alias first)
pub fn lookup(code: u8) -> Result<BinaryType> {
    registry()
        .by_code
        .get(&code)
        .copied()
        .ok_or_else(|| ThinError::UnknownType(format!("unknown type code {}", code)))
}

/// Descriptor for a logical type name
pub fn describe(name: &str) -> Result<&'static TypeDescriptor> {
    name.parse::<BinaryType>().map(BinaryType::descriptor)
}
