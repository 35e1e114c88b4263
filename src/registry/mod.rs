//! SSL bundle registry.
//!
//! The registry is the downstream consumer of the resolution engine: it
//! holds fully-resolved [`SslBundle`]s by name and builds rustls configs
//! from them.
//!
//! # Architecture
//!
//! ```text
//! Config (ssl.bundle.pem)
//!   → VaultSslBundleRegistrar  (runs BundleResolver over every bundle)
//!   → SslBundleRegistry        (name → SslBundle)
//!   → SslBundle::server_config / client_config
//! ```
//!
//! Bundles can also be requested by path: asking for `vault:<path>` loads
//! `certificate`, `private-key` and `ca-certificate` straight from that
//! secret the first time it is requested.
//!
//! # Modules
//!
//! - [`ssl_bundle`]: `SslBundle` and rustls config building
//! - [`registrar`]: registration pass over configured bundles

pub mod registrar;
pub mod ssl_bundle;

pub use registrar::VaultSslBundleRegistrar;
pub use ssl_bundle::SslBundle;

use std::sync::Arc;

use bundle_core::{
    CA_CERTIFICATE_FIELD, CERTIFICATE_FIELD, PRIVATE_KEY_FIELD, ReferenceError, SecretReference,
};
use dashmap::DashMap;
use tracing::debug;

use crate::bundle::Slot;
use crate::resolver::BundleResolver;
use crate::{Error, Result};

/// Name → bundle registry.
#[derive(Default)]
pub struct SslBundleRegistry {
    bundles: DashMap<String, Arc<SslBundle>>,
    loader: Option<Arc<BundleResolver>>,
}

impl SslBundleRegistry {
    /// Create an empty registry without on-demand loading.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that loads `<prefix><path>` bundles on demand.
    #[must_use]
    pub fn with_loader(resolver: Arc<BundleResolver>) -> Self {
        Self {
            bundles: DashMap::new(),
            loader: Some(resolver),
        }
    }

    /// Register (or replace) a bundle.
    pub fn register(&self, bundle: SslBundle) {
        debug!(bundle = bundle.name(), "Registering SSL bundle");
        self.bundles
            .insert(bundle.name().to_string(), Arc::new(bundle));
    }

    /// Look up a registered bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BundleNotFound`] if no bundle has that name.
    pub fn get(&self, name: &str) -> Result<Arc<SslBundle>> {
        self.bundles
            .get(name)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| Error::BundleNotFound(name.to_string()))
    }

    /// Look up a bundle, loading `<prefix><path>` names from Vault on first
    /// use.
    ///
    /// The secret must provide `certificate` and `private-key`;
    /// `ca-certificate` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BundleNotFound`] for unknown non-path names, and a
    /// [`Error::BundleResolution`] naming the bundle if loading fails.
    pub async fn get_or_load(&self, name: &str) -> Result<Arc<SslBundle>> {
        if let Ok(bundle) = self.get(name) {
            return Ok(bundle);
        }

        let Some(resolver) = self.loader.as_ref() else {
            return Err(Error::BundleNotFound(name.to_string()));
        };
        let Some(path) = name
            .strip_prefix(resolver.parser().prefix())
            .filter(|_| resolver.parser().is_reference(name))
        else {
            return Err(Error::BundleNotFound(name.to_string()));
        };

        let bundle = Self::load_path_bundle(resolver, name, path)
            .await
            .map_err(|e| e.in_bundle(name))?;
        self.register(bundle);
        self.get(name)
    }

    async fn load_path_bundle(
        resolver: &BundleResolver,
        name: &str,
        path: &str,
    ) -> Result<SslBundle> {
        if path.trim().is_empty() {
            return Err(ReferenceError::EmptyPath {
                expression: name.to_string(),
                prefix: resolver.parser().prefix().to_string(),
            }
            .into());
        }

        debug!(bundle = name, path = path, "Loading SSL bundle from Vault path");
        let doc = resolver.fetch_document(name, path).await?;

        let field = |field: &str, description: &str| {
            resolver.extract_field(
                name,
                &SecretReference::new(path, field),
                &doc,
                description,
            )
        };
        let require = |value: Option<String>, slot: Slot, field: &str| {
            value.ok_or_else(|| Error::UnresolvedField {
                slot,
                path: path.to_string(),
                field: field.to_string(),
            })
        };

        let certificate = require(
            field(CERTIFICATE_FIELD, "certificate"),
            Slot::KeystoreCertificate,
            CERTIFICATE_FIELD,
        )?;
        let private_key = require(
            field(PRIVATE_KEY_FIELD, "private key"),
            Slot::KeystorePrivateKey,
            PRIVATE_KEY_FIELD,
        )?;
        let ca_certificate = doc.lookup(CA_CERTIFICATE_FIELD).value().map(str::to_string);

        Ok(SslBundle::new(
            name,
            Some(certificate),
            Some(private_key),
            ca_certificate,
        ))
    }

    /// Registered bundle names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
