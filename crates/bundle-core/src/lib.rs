//! Vault SSL bundle core primitives.
//!
//! Pure, I/O-free building blocks shared by the resolver and the CLI:
//!
//! - [`reference`]: the `vault:<path>[:<field>]` expression grammar
//! - [`document`]: KV v1 / KV v2 payload normalization and typed field lookup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod reference;

pub use document::{FieldLookup, KvVersion, SecretDocument};
pub use reference::{
    CA_CERTIFICATE_FIELD, CERTIFICATE_FIELD, DEFAULT_PREFIX, PRIVATE_KEY_FIELD, ReferenceError,
    ReferenceParser, SecretReference, is_reference, parse,
};
