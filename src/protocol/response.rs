//! Response definitions
//!
//! Decoded response fields as produced by the packet engine, and the typed
//! replies that commands build from them.

use bytes::Bytes;

use crate::binary::{self, Value, ValueMap};
use crate::error::{Result, ThinError};

/// One decoded response field
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseField {
    /// Any fixed-width integer field
    Int(i64),
    /// Raw bytes of a binary object field, still encoded
    Object(Bytes),
}

/// Decoded response fields, in decode order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseFields {
    fields: Vec<(&'static str, ResponseField)>,
}

impl ResponseFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field; a later field with the same name replaces the earlier one
    pub fn insert(&mut self, name: &'static str, field: ResponseField) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResponseField> {
        self.fields
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, field)| field)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ResponseField::Int(n) => Some(*n),
            ResponseField::Object(_) => None,
        }
    }

    pub fn object(&self, name: &str) -> Option<&Bytes> {
        match self.get(name)? {
            ResponseField::Object(bytes) => Some(bytes),
            ResponseField::Int(_) => None,
        }
    }

    /// Decode a binary object field
    pub fn decode_object(&self, name: &str) -> Result<Value> {
        let bytes = self.object(name).ok_or_else(|| missing(name))?;
        binary::deserialize(bytes)
    }

    pub fn status(&self) -> Option<i32> {
        self.int("status").map(|n| n as i32)
    }

    pub fn success(&self) -> Option<bool> {
        self.int("success").map(|n| n != 0)
    }

    pub fn request_id(&self) -> Option<u64> {
        self.int("request_id").map(|n| n as u64)
    }

    /// Field names in decode order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Integer field that must be present
    pub(crate) fn require_int(&self, name: &str) -> Result<i64> {
        self.int(name).ok_or_else(|| missing(name))
    }

    /// Object field that must be present
    pub(crate) fn require_object(&self, name: &str) -> Result<&Bytes> {
        self.object(name).ok_or_else(|| missing(name))
    }
}

fn missing(name: &str) -> ThinError {
    ThinError::Protocol(format!("response has no {} field", name))
}

// =============================================================================
// Typed Replies
// =============================================================================

/// One page of scan query results
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    /// Server cursor; pass to the next-page request
    pub cursor_id: i64,

    /// `(key, value)` rows in server order
    pub rows: Vec<(Value, Value)>,

    /// Whether the server holds further pages
    pub has_more: bool,
}

/// Result of a cache command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Operation has no result
    Done,
    /// A single value (GET)
    Value(Value),
    /// Boolean result (contains, remove)
    Flag(bool),
    /// Entry count
    Size(i64),
    /// Key/value entries (GET_ALL)
    Entries(ValueMap),
    /// Sorted cache names
    Names(Vec<String>),
    /// Scan query page
    Page(ScanPage),
}

impl Reply {
    /// Collapse into a plain value
    ///
    /// Names become a list of strings, scan pages a list of `[key, value]`
    /// lists.
    pub fn into_value(self) -> Value {
        match self {
            Reply::Done => Value::Null,
            Reply::Value(value) => value,
            Reply::Flag(flag) => Value::Bool(flag),
            Reply::Size(size) => Value::Long(size),
            Reply::Entries(entries) => Value::Map(entries),
            Reply::Names(names) => Value::List(names.into_iter().map(Value::String).collect()),
            Reply::Page(page) => Value::List(
                page.rows
                    .into_iter()
                    .map(|(key, value)| Value::List(vec![key, value]))
                    .collect(),
            ),
        }
    }
}
