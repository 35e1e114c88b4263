//! Secret documents read from Vault.
//!
//! KV v2 wraps the secret fields in a nested `data` object next to
//! `metadata`; KV v1 returns the fields directly. The engine cannot know
//! which engine backs a path, so every payload goes through
//! [`SecretDocument::normalize`].

use serde_json::{Map, Value};

/// Key under which KV v2 nests the secret fields.
pub const KV_V2_DATA_KEY: &str = "data";

/// Shape a payload was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvVersion {
    /// Flat field map.
    #[default]
    V1,
    /// Fields nested under `data`.
    V2,
}

/// Normalized field map for one secret path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecretDocument {
    fields: Map<String, Value>,
    version: KvVersion,
}

/// Outcome of looking up a field in a [`SecretDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup<'a> {
    /// The field exists and is a string.
    Found(&'a str),
    /// The field does not exist.
    Missing,
    /// The field exists but holds a non-string JSON value of the given kind.
    NotAString(&'static str),
}

impl<'a> FieldLookup<'a> {
    /// The string value, if one was found.
    #[must_use]
    pub fn value(self) -> Option<&'a str> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing | Self::NotAString(_) => None,
        }
    }
}

impl SecretDocument {
    /// Strip engine-specific nesting from a raw payload.
    ///
    /// A `data` key holding an object means KV v2; anything else is treated
    /// as a flat KV v1 document, including a `data` key with a scalar value.
    #[must_use]
    pub fn normalize(mut raw: Map<String, Value>) -> Self {
        if matches!(raw.get(KV_V2_DATA_KEY), Some(Value::Object(_))) {
            if let Some(Value::Object(fields)) = raw.remove(KV_V2_DATA_KEY) {
                return Self {
                    fields,
                    version: KvVersion::V2,
                };
            }
        }
        Self {
            fields: raw,
            version: KvVersion::V1,
        }
    }

    /// Detected engine shape.
    #[must_use]
    pub fn version(&self) -> KvVersion {
        self.version
    }

    /// Number of fields after normalization.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if no fields remain after normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw access to a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Typed lookup; type mismatches are reported, not raised.
    #[must_use]
    pub fn lookup(&self, field: &str) -> FieldLookup<'_> {
        match self.fields.get(field) {
            Some(Value::String(value)) => FieldLookup::Found(value),
            Some(other) => FieldLookup::NotAString(value_kind(other)),
            None => FieldLookup::Missing,
        }
    }
}

/// JSON type name, for diagnostics.
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
