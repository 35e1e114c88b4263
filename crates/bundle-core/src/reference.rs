//! Secret reference expressions.
//!
//! A reference points at a field of a secret stored in Vault:
//!
//! ```text
//! vault:secret/data/ssl-certs/my-service              → path only, field defaulted
//! vault:secret/data/ssl-certs/my-service:server_cert  → explicit field
//! ```
//!
//! The field is taken from the text after the **last** `:` so that paths may
//! themselves contain the separator.

use std::fmt;

use thiserror::Error;

/// Prefix used when none (or a blank one) is configured.
pub const DEFAULT_PREFIX: &str = "vault:";

/// Default field for keystore certificates.
pub const CERTIFICATE_FIELD: &str = "certificate";

/// Default field for keystore private keys.
pub const PRIVATE_KEY_FIELD: &str = "private-key";

/// Default field for truststore (CA) certificates.
pub const CA_CERTIFICATE_FIELD: &str = "ca-certificate";

const FIELD_SEPARATOR: char = ':';

/// A parsed reference: the secret path plus the field to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretReference {
    path: String,
    field: String,
}

impl SecretReference {
    /// Build a reference from its parts.
    pub fn new(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field: field.into(),
        }
    }

    /// Secret path inside Vault (without the prefix).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Field name inside the secret document.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Same secret path, different field.
    #[must_use]
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        Self::new(self.path.clone(), field)
    }
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{FIELD_SEPARATOR}{}", self.path, self.field)
    }
}

/// Malformed reference expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// The expression does not carry the configured prefix.
    #[error("'{expression}' does not start with prefix '{prefix}'")]
    MissingPrefix {
        /// Offending expression
        expression: String,
        /// Configured prefix
        prefix: String,
    },

    /// The path after the prefix is empty or blank.
    #[error("empty secret path after prefix '{prefix}' in '{expression}'")]
    EmptyPath {
        /// Offending expression
        expression: String,
        /// Configured prefix
        prefix: String,
    },
}

/// Returns `true` when `value` is non-blank and starts with `prefix`.
///
/// Literal PEM values never match.
#[must_use]
pub fn is_reference(value: &str, prefix: &str) -> bool {
    !value.trim().is_empty() && value.starts_with(prefix)
}

/// Parse `expression` into a [`SecretReference`].
///
/// `default_field` is used when the expression names no field, including the
/// case of a trailing `:` (the whole remainder is then the path).
pub fn parse(
    expression: &str,
    default_field: &str,
    prefix: &str,
) -> Result<SecretReference, ReferenceError> {
    let remainder = expression
        .strip_prefix(prefix)
        .filter(|_| is_reference(expression, prefix))
        .ok_or_else(|| ReferenceError::MissingPrefix {
            expression: expression.to_string(),
            prefix: prefix.to_string(),
        })?;

    let (path, field) = match remainder.rfind(FIELD_SEPARATOR) {
        Some(idx) if idx > 0 && idx < remainder.len() - 1 => {
            (&remainder[..idx], &remainder[idx + 1..])
        }
        _ => (remainder, default_field),
    };

    // Blank remainder, or a field with nothing before it
    if path.trim().is_empty() {
        return Err(ReferenceError::EmptyPath {
            expression: expression.to_string(),
            prefix: prefix.to_string(),
        });
    }

    Ok(SecretReference::new(path, field))
}

/// A parser bound to one configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceParser {
    prefix: String,
}

impl ReferenceParser {
    /// Create a parser; a blank prefix falls back to [`DEFAULT_PREFIX`].
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            Self::default()
        } else {
            Self { prefix }
        }
    }

    /// The prefix this parser recognizes.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// See [`is_reference`].
    #[must_use]
    pub fn is_reference(&self, value: &str) -> bool {
        is_reference(value, &self.prefix)
    }

    /// See [`parse`].
    pub fn parse(
        &self,
        expression: &str,
        default_field: &str,
    ) -> Result<SecretReference, ReferenceError> {
        parse(expression, default_field, &self.prefix)
    }
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}
