//! Registration pass: resolve configured bundles and register them.

use std::sync::Arc;

use tracing::{debug, info};

use super::{SslBundle, SslBundleRegistry};
use crate::bundle::PemBundles;
use crate::resolver::{BundleResolver, ResolutionReport};
use crate::{Error, Result};

/// Resolves `ssl.bundle.pem` through Vault and fills a registry.
pub struct VaultSslBundleRegistrar {
    resolver: Arc<BundleResolver>,
}

impl VaultSslBundleRegistrar {
    /// Create a registrar driven by `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<BundleResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve every bundle and register the ones that succeeded.
    ///
    /// Successful bundles are registered even when others fail, so one bad
    /// secret does not take every listener down. Bundles with neither a
    /// keystore nor a truststore certificate are not registered.
    ///
    /// Returns the full [`ResolutionReport`] for the caller to inspect.
    pub async fn register(
        &self,
        bundles: &PemBundles,
        registry: &SslBundleRegistry,
    ) -> ResolutionReport {
        if bundles.is_empty() {
            debug!("No PEM bundles configured, skipping Vault SSL bundle registration");
            return ResolutionReport::default();
        }

        let report = self.resolver.resolve_all(bundles).await;

        for (name, resolved) in &report.resolved {
            let bundle = SslBundle::from_config(name, resolved);
            if bundle.has_keystore() || bundle.has_truststore() {
                registry.register(bundle);
            } else {
                debug!(bundle = %name, "Bundle has no certificates, not registered");
            }
        }

        info!(
            registered = report.resolved.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "Vault SSL bundle registration finished"
        );

        report
    }

    /// Like [`register`](Self::register), but turns any failure into an
    /// [`Error::Registration`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] listing every failed bundle.
    pub async fn register_bundles(
        &self,
        bundles: &PemBundles,
        registry: &SslBundleRegistry,
    ) -> Result<Vec<String>> {
        let report = self.register(bundles, registry).await;
        let names = report.resolved.keys().cloned().collect();
        if report.failures.is_empty() {
            Ok(names)
        } else {
            Err(Error::Registration {
                failures: report.failures,
            })
        }
    }
}
