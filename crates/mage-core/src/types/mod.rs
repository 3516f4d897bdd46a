//! # Core Type Definitions
//!
//! This module contains the storage-facing types shared by every component:
//! - Entity keys (`Key`) and their URL-safe encoding
//! - Stored values (`Value`, `Property`, `Entity`)
//! - Error types (`MageError`)
//!
//! Entities are what the primary store sees. Typed records never reach the
//! store directly; they are flattened into an `Entity` by `formats::entity`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// KEYS
// =============================================================================

/// Identifier of a stored entity: the kind (type name) plus a numeric id.
///
/// An id of `0` marks an *incomplete* key. Putting an entity under an
/// incomplete key asks the store to allocate the id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    id: i64,
}

impl Key {
    /// Create a complete key.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }

    /// Create an incomplete key for the given kind.
    #[must_use]
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self::new(kind, 0)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// True when the store still has to assign an id.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.id == 0
    }

    /// Opaque, URL-safe string form of the key. Used as the cache key.
    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.kind, self.id))
    }

    /// Inverse of [`Key::encode`].
    pub fn decode(encoded: &str) -> Result<Self, MageError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| MageError::InvalidKey(e.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|e| MageError::InvalidKey(e.to_string()))?;
        let (kind, id) = text
            .rsplit_once(':')
            .ok_or_else(|| MageError::InvalidKey(format!("missing separator in '{}'", text)))?;
        if kind.is_empty() {
            return Err(MageError::InvalidKey("empty kind".to_string()));
        }
        let id = id
            .parse::<i64>()
            .map_err(|e| MageError::InvalidKey(e.to_string()))?;
        Ok(Self::new(kind, id))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Key(Key),
    List(Vec<Value>),
}

impl Value {
    /// Name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Key(_) => "key",
            Self::List(_) => "list",
        }
    }

    pub fn into_text(self, field: &str) -> Result<String, MageError> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(MageError::field_type(field, "text", &other)),
        }
    }

    pub fn into_int(self, field: &str) -> Result<i64, MageError> {
        match self {
            Self::Int(i) => Ok(i),
            other => Err(MageError::field_type(field, "int", &other)),
        }
    }

    pub fn into_bool(self, field: &str) -> Result<bool, MageError> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(MageError::field_type(field, "bool", &other)),
        }
    }

    pub fn into_bytes(self, field: &str) -> Result<Vec<u8>, MageError> {
        match self {
            Self::Bytes(b) => Ok(b),
            other => Err(MageError::field_type(field, "bytes", &other)),
        }
    }

    pub fn into_key(self, field: &str) -> Result<Key, MageError> {
        match self {
            Self::Key(k) => Ok(k),
            other => Err(MageError::field_type(field, "key", &other)),
        }
    }

    pub fn into_list(self, field: &str) -> Result<Vec<Value>, MageError> {
        match self {
            Self::List(l) => Ok(l),
            other => Err(MageError::field_type(field, "list", &other)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Key> for Value {
    fn from(value: Key) -> Self {
        Self::Key(value)
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A named value inside an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
    /// False for `noindex` fields.
    pub indexed: bool,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value, indexed: bool) -> Self {
        Self {
            name: name.into(),
            value,
            indexed,
        }
    }
}

/// The store-native representation of one record: its kind and property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    kind: String,
    properties: Vec<Property>,
}

impl Entity {
    #[must_use]
    pub fn new(kind: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            kind: kind.into(),
            properties,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn into_properties(self) -> Vec<Property> {
        self.properties
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Mage engine.
///
/// `StoreError` and `CacheError` carry the collaborator's message unchanged.
/// `UnaddressableField` is a schema-authoring defect; see [`MageError::is_fatal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MageError {
    /// An operation was attempted on an unregistered record.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// `create` was called on a record that already has a key.
    #[error("{kind} has already been created")]
    AlreadyCreated { kind: String },

    /// `update` or `read` was called on a record without a key.
    #[error("{kind} has no key")]
    MissingKey { kind: String },

    /// A reference field declared by a structure cannot be reached on the instance.
    #[error("Unaddressable reference field {structure}.{field}")]
    UnaddressableField { structure: String, field: String },

    /// No entity is stored under the key.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// A stored value does not match the field it is loaded into.
    #[error("Field {field}: expected {expected}, found {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An encoded key could not be decoded.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The transaction collided with a concurrent writer.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// The primary store failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem or configuration I/O failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The cache has no entry for the key.
    #[error("Cache miss: {0}")]
    CacheMiss(String),

    /// The cache collaborator failed.
    #[error("Cache error: {0}")]
    CacheError(String),
}

impl MageError {
    pub(crate) fn field_type(field: &str, expected: &'static str, found: &Value) -> Self {
        Self::FieldType {
            field: field.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    /// Schema defects cannot be recovered from at runtime; callers must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnaddressableField { .. })
    }
}
