//! Command definitions
//!
//! Typed cache operations. Each command knows its packet, how to fill the
//! request field map, and how to read its reply out of the decoded response.

use crate::binary::{self, BinaryType, Value, ValueMap};
use crate::error::{Result, ThinError};

use super::packet::{self, PacketSpec};
use super::request::{BinaryObjects, RequestFields};
use super::response::{Reply, ResponseFields, ScanPage};

/// Default rows per scan page
pub const DEFAULT_PAGE_SIZE: i32 = 1024;

/// A value plus an optional logical type to encode it as
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: Value,
    pub ty: Option<BinaryType>,
}

impl TypedValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ty: None,
        }
    }

    pub fn with_type(value: impl Into<Value>, ty: BinaryType) -> Self {
        Self {
            value: value.into(),
            ty: Some(ty),
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// A cache operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read one value
    Get { cache: String, key: TypedValue },

    /// Store one value
    Put { cache: String, key: TypedValue, value: TypedValue },

    /// Read several values
    GetAll { cache: String, keys: Vec<Value> },

    /// Store several entries
    PutAll { cache: String, entries: ValueMap },

    ContainsKey { cache: String, key: TypedValue },

    ContainsKeys { cache: String, keys: Vec<Value> },

    /// Drop every entry (without notifying listeners)
    Clear { cache: String },

    ClearKey { cache: String, key: TypedValue },

    /// Remove one key; replies whether it was present
    RemoveKey { cache: String, key: TypedValue },

    RemoveAll { cache: String },

    Size { cache: String },

    /// List cache names
    Names,

    CreateCache { cache: String },

    DestroyCache { cache: String },

    /// Open a scan cursor and fetch its first page
    Scan { cache: String, page_size: i32 },

    /// Fetch the next page of an open scan cursor
    ScanPage { cursor_id: i64 },

    /// Release a server-side resource such as a cursor
    CloseResource { resource_id: i64 },
}

impl Command {
    /// Packet used on the wire
    pub fn operation(&self) -> &'static PacketSpec {
        match self {
            Command::Get { .. } => &packet::OP_CACHE_GET,
            Command::Put { .. } => &packet::OP_CACHE_PUT,
            Command::GetAll { .. } => &packet::OP_CACHE_GET_ALL,
            Command::PutAll { .. } => &packet::OP_CACHE_PUT_ALL,
            Command::ContainsKey { .. } => &packet::OP_CACHE_CONTAINS_KEY,
            Command::ContainsKeys { .. } => &packet::OP_CACHE_CONTAINS_KEYS,
            Command::Clear { .. } => &packet::OP_CACHE_CLEAR,
            Command::ClearKey { .. } => &packet::OP_CACHE_CLEAR_KEY,
            Command::RemoveKey { .. } => &packet::OP_CACHE_REMOVE_KEY,
            Command::RemoveAll { .. } => &packet::OP_CACHE_REMOVE_ALL,
            Command::Size { .. } => &packet::OP_CACHE_GET_SIZE,
            Command::Names => &packet::OP_CACHE_GET_NAMES,
            Command::CreateCache { .. } => &packet::OP_CACHE_CREATE_WITH_NAME,
            Command::DestroyCache { .. } => &packet::OP_CACHE_DESTROY,
            Command::Scan { .. } => &packet::OP_QUERY_SCAN,
            Command::ScanPage { .. } => &packet::OP_QUERY_SCAN_CURSOR_GET_PAGE,
            Command::CloseResource { .. } => &packet::OP_RESOURCE_CLOSE,
        }
    }

    /// Force the logical type of the key, where the command has a single key
    pub fn with_key_type(mut self, ty: BinaryType) -> Self {
        match &mut self {
            Command::Get { key, .. }
            | Command::Put { key, .. }
            | Command::ContainsKey { key, .. }
            | Command::ClearKey { key, .. }
            | Command::RemoveKey { key, .. } => key.ty = Some(ty),
            _ => {}
        }
        self
    }

    /// Force the logical type of the value (PUT only)
    pub fn with_value_type(mut self, ty: BinaryType) -> Self {
        if let Command::Put { value, .. } = &mut self {
            value.ty = Some(ty);
        }
        self
    }

    /// Request field map for this command
    pub fn to_fields(&self) -> RequestFields {
        match self {
            Command::Get { cache, key }
            | Command::ContainsKey { cache, key }
            | Command::ClearKey { cache, key }
            | Command::RemoveKey { cache, key } => with_typed(
                RequestFields::new().cache(cache.as_str()),
                "binary_object_key",
                key,
            ),
            Command::Put { cache, key, value } => {
                let fields = with_typed(RequestFields::new().cache(cache.as_str()), "binary_object_key", key);
                with_typed(fields, "binary_object_value", value)
            }
            Command::GetAll { cache, keys } | Command::ContainsKeys { cache, keys } => RequestFields::new()
                .cache(cache.as_str())
                .objects(BinaryObjects::List(keys.clone())),
            Command::PutAll { cache, entries } => {
                let pairs = entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                RequestFields::new()
                    .cache(cache.as_str())
                    .objects(BinaryObjects::Pairs(pairs))
            }
            Command::Clear { cache }
            | Command::RemoveAll { cache }
            | Command::Size { cache }
            | Command::DestroyCache { cache } => RequestFields::new().cache(cache.as_str()),
            Command::Names => RequestFields::new(),
            Command::CreateCache { cache } => {
                RequestFields::new().with_type("binary_object", cache.as_str(), BinaryType::String)
            }
            Command::Scan { cache, page_size } => RequestFields::new()
                .cache(cache.as_str())
                .with("binary_object_filter", Value::Null)
                .with("filter_platform", 0i8)
                .with("cursor_page_size", *page_size)
                .with("partition", -1i32)
                .with("local", false),
            Command::ScanPage { cursor_id } => RequestFields::new().with("cursor_id", *cursor_id),
            Command::CloseResource { resource_id } => RequestFields::new().with("resource_id", *resource_id),
        }
    }

    /// Build the typed reply from a successful response
    pub fn reply(&self, response: &ResponseFields) -> Result<Reply> {
        match self {
            Command::Get { .. } => response.decode_object("binary_object").map(Reply::Value),
            Command::GetAll { .. } => {
                let count = response_count(response)?;
                let body = response.require_object("binary_object")?;
                let (rows, _) = read_rows(body, count)?;
                Ok(Reply::Entries(rows.into_iter().collect()))
            }
            Command::ContainsKey { .. } | Command::ContainsKeys { .. } | Command::RemoveKey { .. } => {
                Ok(Reply::Flag(response.require_int("bool")? != 0))
            }
            Command::Size { .. } => Ok(Reply::Size(response.require_int("long")?)),
            Command::Names => {
                let body = response.require_object("binary_object")?;
                // Body is a string array without its leading type code
                let (names, _) =
                    binary::decode_entry(body, 0, Some(BinaryType::StringArray.code()), None)?;
                let mut names: Vec<String> = names
                    .as_list()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect();
                names.sort();
                Ok(Reply::Names(names))
            }
            Command::Scan { .. } => {
                let cursor_id = response.require_int("cursor_id")?;
                scan_page(cursor_id, response).map(Reply::Page)
            }
            Command::ScanPage { cursor_id } => scan_page(*cursor_id, response).map(Reply::Page),
            Command::Put { .. }
            | Command::PutAll { .. }
            | Command::Clear { .. }
            | Command::ClearKey { .. }
            | Command::RemoveAll { .. }
            | Command::CreateCache { .. }
            | Command::DestroyCache { .. }
            | Command::CloseResource { .. } => Ok(Reply::Done),
        }
    }

    /// Method name accepted by [`Command::from_call`]
    pub fn method_name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "cache_get",
            Command::Put { .. } => "cache_put",
            Command::GetAll { .. } => "cache_get_all",
            Command::PutAll { .. } => "cache_put_all",
            Command::ContainsKey { .. } => "cache_contains_key",
            Command::ContainsKeys { .. } => "cache_contains_keys",
            Command::Clear { .. } => "cache_clear",
            Command::ClearKey { .. } => "cache_clear_key",
            Command::RemoveKey { .. } => "cache_remove_key",
            Command::RemoveAll { .. } => "cache_remove_all",
            Command::Size { .. } => "cache_get_size",
            Command::Names => "cache_get_names",
            Command::CreateCache { .. } => "cache_create_with_name",
            Command::DestroyCache { .. } => "cache_destroy",
            Command::Scan { .. } => "cache_scan",
            Command::ScanPage { .. } => "cache_scan_page",
            Command::CloseResource { .. } => "resource_close",
        }
    }

    /// Build a command from a method name and positional arguments
    ///
    /// Every problem with the call is a `PoolArgument` error.
    pub fn from_call(method: &str, args: &[Value]) -> Result<Command> {
        let call = Call { method, args };
        let command = match method {
            "cache_get" => {
                call.arity(2)?;
                Command::Get { cache: call.cache()?, key: call.typed(1) }
            }
            "cache_put" => {
                call.arity(3)?;
                Command::Put { cache: call.cache()?, key: call.typed(1), value: call.typed(2) }
            }
            "cache_get_all" => {
                call.arity(2)?;
                Command::GetAll { cache: call.cache()?, keys: call.list(1)? }
            }
            "cache_put_all" => {
                call.arity(2)?;
                Command::PutAll { cache: call.cache()?, entries: call.map(1)? }
            }
            "cache_contains_key" => {
                call.arity(2)?;
                Command::ContainsKey { cache: call.cache()?, key: call.typed(1) }
            }
            "cache_contains_keys" => {
                call.arity(2)?;
                Command::ContainsKeys { cache: call.cache()?, keys: call.list(1)? }
            }
            "cache_clear" => {
                call.arity(1)?;
                Command::Clear { cache: call.cache()? }
            }
            "cache_clear_key" => {
                call.arity(2)?;
                Command::ClearKey { cache: call.cache()?, key: call.typed(1) }
            }
            "cache_remove_key" => {
                call.arity(2)?;
                Command::RemoveKey { cache: call.cache()?, key: call.typed(1) }
            }
            "cache_remove_all" => {
                call.arity(1)?;
                Command::RemoveAll { cache: call.cache()? }
            }
            "cache_get_size" => {
                call.arity(1)?;
                Command::Size { cache: call.cache()? }
            }
            "cache_get_names" => {
                call.arity(0)?;
                Command::Names
            }
            "cache_create_with_name" => {
                call.arity(1)?;
                Command::CreateCache { cache: call.cache()? }
            }
            "cache_destroy" => {
                call.arity(1)?;
                Command::DestroyCache { cache: call.cache()? }
            }
            "cache_scan" => {
                let page_size = match args.len() {
                    1 => DEFAULT_PAGE_SIZE,
                    2 => call.int(1)?,
                    _ => return Err(call.bad_arity("1 or 2")),
                };
                Command::Scan { cache: call.cache()?, page_size }
            }
            "cache_scan_page" => {
                call.arity(1)?;
                Command::ScanPage { cursor_id: call.long(0)? }
            }
            "resource_close" => {
                call.arity(1)?;
                Command::CloseResource { resource_id: call.long(0)? }
            }
            other => {
                return Err(ThinError::PoolArgument(format!("unknown method {}", other)));
            }
        };
        Ok(command)
    }
}

fn with_typed(fields: RequestFields, field: &str, typed: &TypedValue) -> RequestFields {
    match typed.ty {
        Some(ty) => fields.with_type(field, typed.value.clone(), ty),
        None => fields.with(field, typed.value.clone()),
    }
}

fn response_count(response: &ResponseFields) -> Result<usize> {
    let count = response.require_int("binary_object_count")?;
    usize::try_from(count)
        .map_err(|_| ThinError::Protocol(format!("negative result count {}", count)))
}

/// Decode `count` key/value pairs; returns the rows and the offset after them
fn read_rows(body: &[u8], count: usize) -> Result<(Vec<(Value, Value)>, usize)> {
    let (flat, end) = binary::decode_entries(body, 0, count.saturating_mul(2))?;
    let mut rows = Vec::with_capacity(count);
    let mut flat = flat.into_iter();
    while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
        rows.push((key, value));
    }
    Ok((rows, end))
}

/// Rows followed by a trailing "more pages" byte
fn scan_page(cursor_id: i64, response: &ResponseFields) -> Result<ScanPage> {
    let count = response_count(response)?;
    let body = response.require_object("binary_object")?;
    let (rows, end) = read_rows(body, count)?;
    let has_more = body.get(end).map(|flag| *flag != 0).unwrap_or(false);
    Ok(ScanPage { cursor_id, rows, has_more })
}

// =============================================================================
// Call Validation
// =============================================================================

/// Positional arguments of a named call
struct Call<'a> {
    method: &'a str,
    args: &'a [Value],
}

impl Call<'_> {
    fn arity(&self, expected: usize) -> Result<()> {
        if self.args.len() != expected {
            return Err(self.bad_arity(&expected.to_string()));
        }
        Ok(())
    }

    fn bad_arity(&self, expected: &str) -> ThinError {
        ThinError::PoolArgument(format!(
            "{} takes {} argument(s), got {}",
            self.method,
            expected,
            self.args.len()
        ))
    }

    fn bad_arg(&self, index: usize, wanted: &str) -> ThinError {
        ThinError::PoolArgument(format!(
            "{}: argument {} must be {}, got {}",
            self.method, index, wanted, self.args[index]
        ))
    }

    fn cache(&self) -> Result<String> {
        self.args[0]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad_arg(0, "a cache name"))
    }

    fn typed(&self, index: usize) -> TypedValue {
        TypedValue::new(self.args[index].clone())
    }

    fn list(&self, index: usize) -> Result<Vec<Value>> {
        self.args[index]
            .as_list()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| self.bad_arg(index, "a list"))
    }

    fn map(&self, index: usize) -> Result<ValueMap> {
        self.args[index]
            .as_map()
            .cloned()
            .ok_or_else(|| self.bad_arg(index, "a map"))
    }

    fn long(&self, index: usize) -> Result<i64> {
        match &self.args[index] {
            Value::Bool(_) => Err(self.bad_arg(index, "an integer")),
            other => other.as_i64().ok_or_else(|| self.bad_arg(index, "an integer")),
        }
    }

    fn int(&self, index: usize) -> Result<i32> {
        let n = self.long(index)?;
        i32::try_from(n).map_err(|_| self.bad_arg(index, "a 32-bit integer"))
    }
}
