//! Request field maps
//!
//! Values keyed by field name that the packet engine looks up while walking a
//! request layout. A field may carry a type override under `<field>.type`.

use std::collections::HashMap;

use crate::binary::{BinaryType, Value};
use crate::error::{Result, ThinError};

/// Suffix of a type-override key
pub const TYPE_SUFFIX: &str = ".type";

/// Payload of a `binary_objects` field
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryObjects {
    /// Each element is encoded as one binary object
    List(Vec<Value>),
    /// Each pair is encoded as key object then value object
    Pairs(Vec<(Value, Value)>),
}

impl BinaryObjects {
    /// Number of elements (pairs count once)
    pub fn len(&self) -> usize {
        match self {
            BinaryObjects::List(items) => items.len(),
            BinaryObjects::Pairs(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named inputs for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFields {
    cache: Option<String>,
    values: HashMap<String, Value>,
    types: HashMap<String, BinaryType>,
    objects: Option<BinaryObjects>,
}

impl RequestFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache name; hashed into `cache_id`
    pub fn cache(mut self, name: impl Into<String>) -> Self {
        self.cache = Some(name.into());
        self
    }

    /// Set a field value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Set a field value together with the logical type to encode it as
    pub fn with_type(mut self, field: impl Into<String>, value: impl Into<Value>, ty: BinaryType) -> Self {
        let field = field.into();
        self.types.insert(field.clone(), ty);
        self.values.insert(field, value.into());
        self
    }

    /// Set the `binary_objects` batch
    pub fn objects(mut self, objects: BinaryObjects) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Set a field from a textual key
    ///
    /// `<field>.type` keys name a logical type and become the override for
    /// `<field>`; everything else is stored as a value.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        match key.strip_suffix(TYPE_SUFFIX) {
            Some(field) => {
                let name = value.as_str().ok_or_else(|| {
                    ThinError::UnknownType(format!("{} must name a type, got {}", key, value))
                })?;
                self.types.insert(field.to_string(), name.parse()?);
            }
            None => {
                self.values.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn cache_name(&self) -> Option<&str> {
        self.cache.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Logical type forced for `field`, if any
    pub fn type_override(&self, field: &str) -> Option<BinaryType> {
        self.types.get(field).copied()
    }

    pub fn batch(&self) -> Option<&BinaryObjects> {
        self.objects.as_ref()
    }
}
