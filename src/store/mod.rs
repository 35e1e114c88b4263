//! Secret store clients.
//!
//! The resolution engine only needs one operation: read the document stored
//! at a path. [`SecretStore`] abstracts over the backend so the engine can be
//! driven by the live [`VaultClient`] or by the [`InMemorySecretStore`] used
//! in tests and dry runs.

pub mod memory;
pub mod vault;

pub use memory::InMemorySecretStore;
pub use vault::VaultClient;

use serde_json::Value;

use crate::Result;

/// Read-only access to a key/value secret store.
///
/// Implementations must be `Send + Sync`; a single client is shared by every
/// bundle of a registration pass.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the raw document at `path`.
    ///
    /// Returns `Ok(None)` when nothing is stored there. The document is
    /// returned as the backend delivers it; KV v2 nesting is not stripped.
    async fn read(&self, path: &str) -> Result<Option<Value>>;
}
