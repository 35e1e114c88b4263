//! Bundle resolution engine.
//!
//! Turns configured PEM bundles whose values are Vault references into
//! bundles holding literal PEM text.
//!
//! # Flow
//!
//! ```text
//! for each bundle (configuration order)
//!   fresh DocumentCache
//!   keystore   → parse refs → cached fetch → extract certificate / private-key
//!   truststore → parse ref  → cached fetch → extract ca-certificate
//!                                            (falls back to certificate)
//!   failure    → BundleResolution { bundle, source }, next bundle
//! ```
//!
//! A bundle is only returned once every slot resolved, so callers never see
//! a half-populated bundle. The input configuration is never mutated.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use bundle_core::document::value_kind;
use bundle_core::{
    CA_CERTIFICATE_FIELD, CERTIFICATE_FIELD, FieldLookup, KvVersion, PRIVATE_KEY_FIELD,
    ReferenceParser, SecretDocument, SecretReference,
};
use indexmap::IndexMap;
use serde_json::Value;

use crate::bundle::{KeystoreConfig, PemBundleConfig, PemBundles, Slot, TruststoreConfig};
use crate::config::{FailurePolicy, ResolutionConfig, UnresolvedFieldPolicy};
use crate::diagnostics::{Diagnostics, Event, TracingDiagnostics};
use crate::store::SecretStore;
use crate::{Error, Result};

/// Documents fetched during one bundle's resolution, keyed by secret path.
pub type DocumentCache = HashMap<String, SecretDocument>;

/// Outcome of a registration pass.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    /// Fully resolved bundles, in configuration order
    pub resolved: IndexMap<String, PemBundleConfig>,
    /// One [`Error::BundleResolution`] per failed bundle
    pub failures: Vec<Error>,
    /// Bundles not attempted because the pass stopped early (fail-fast)
    pub skipped: Vec<String>,
}

impl ResolutionReport {
    /// `true` when no bundle failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of failed bundles.
    pub fn failed_bundles(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().filter_map(Error::bundle)
    }

    /// Resolved bundles, or [`Error::Registration`] if any bundle failed.
    pub fn into_result(self) -> Result<IndexMap<String, PemBundleConfig>> {
        if self.failures.is_empty() {
            Ok(self.resolved)
        } else {
            Err(Error::Registration {
                failures: self.failures,
            })
        }
    }
}

/// Resolves Vault references in PEM bundles.
pub struct BundleResolver {
    store: Arc<dyn SecretStore>,
    parser: ReferenceParser,
    diagnostics: Arc<dyn Diagnostics>,
    policy: ResolutionConfig,
}

impl BundleResolver {
    /// Create a resolver with the default prefix, policies and tracing sink.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            parser: ReferenceParser::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            policy: ResolutionConfig::default(),
        }
    }

    /// Recognize references by `prefix` (blank falls back to `vault:`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.parser = ReferenceParser::new(prefix);
        self
    }

    /// Report through `diagnostics` instead of `tracing`.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Use the given failure and unresolved-field policies.
    #[must_use]
    pub fn with_policy(mut self, policy: ResolutionConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Reference parser in use.
    #[must_use]
    pub fn parser(&self) -> &ReferenceParser {
        &self.parser
    }

    /// Active policies.
    #[must_use]
    pub fn policy(&self) -> ResolutionConfig {
        self.policy
    }

    /// Resolve every bundle, sequentially and in order.
    ///
    /// Under [`FailurePolicy::Collect`] a failed bundle does not stop the
    /// pass; under [`FailurePolicy::FailFast`] the remaining bundles are
    /// listed in [`ResolutionReport::skipped`].
    pub async fn resolve_all(&self, bundles: &PemBundles) -> ResolutionReport {
        let mut report = ResolutionReport::default();

        for (index, (name, bundle)) in bundles.iter().enumerate() {
            self.diagnostics
                .debug(Event::new(name, "Processing SSL bundle"));

            match self.resolve_bundle(name, bundle).await {
                Ok(resolved) => {
                    report.resolved.insert(name.clone(), resolved);
                }
                Err(e) => {
                    self.diagnostics.error(Event::new(
                        name,
                        format!("Failed to process SSL bundle from Vault: {e}"),
                    ));
                    report.failures.push(e);
                    if self.policy.failure_policy == FailurePolicy::FailFast {
                        report.skipped = bundles.keys().skip(index + 1).cloned().collect();
                        break;
                    }
                }
            }
        }

        report
    }

    /// Resolve one bundle with its own fresh document cache.
    ///
    /// # Errors
    ///
    /// Any structural failure is returned as [`Error::BundleResolution`]
    /// naming `name`.
    pub async fn resolve_bundle(
        &self,
        name: &str,
        bundle: &PemBundleConfig,
    ) -> Result<PemBundleConfig> {
        let mut cache = DocumentCache::new();
        self.resolve_slots(name, bundle, &mut cache)
            .await
            .map_err(|e| e.in_bundle(name))
    }

    async fn resolve_slots(
        &self,
        name: &str,
        bundle: &PemBundleConfig,
        cache: &mut DocumentCache,
    ) -> Result<PemBundleConfig> {
        let keystore = match bundle.keystore {
            Some(ref keystore) => Some(self.resolve_keystore(name, keystore, cache).await?),
            None => None,
        };
        let truststore = match bundle.truststore {
            Some(ref truststore) => Some(self.resolve_truststore(name, truststore, cache).await?),
            None => None,
        };
        Ok(PemBundleConfig {
            keystore,
            truststore,
        })
    }

    /// Resolve a keystore slot.
    ///
    /// A literal certificate skips the slot entirely. Otherwise the private
    /// key is read from its own reference, or from the certificate's path
    /// under `private-key` when it has none.
    pub async fn resolve_keystore(
        &self,
        bundle: &str,
        keystore: &KeystoreConfig,
        cache: &mut DocumentCache,
    ) -> Result<KeystoreConfig> {
        let Some(cert_expr) = keystore
            .certificate
            .as_deref()
            .filter(|v| self.parser.is_reference(v))
        else {
            return Ok(keystore.clone());
        };

        self.diagnostics
            .info(Event::new(bundle, "Loading keystore certificates from Vault"));

        let cert_ref = self.parser.parse(cert_expr, CERTIFICATE_FIELD)?;
        let key_ref = match keystore
            .private_key
            .as_deref()
            .filter(|v| self.parser.is_reference(v))
        {
            Some(key_expr) => self.parser.parse(key_expr, PRIVATE_KEY_FIELD)?,
            None => cert_ref.with_field(PRIVATE_KEY_FIELD),
        };

        let doc = self.fetch_cached(bundle, cert_ref.path(), cache).await?;
        let certificate = self.extract_field(bundle, &cert_ref, doc, "certificate");
        let certificate = self.settle(
            certificate,
            keystore.certificate.as_deref(),
            &cert_ref,
            Slot::KeystoreCertificate,
        )?;

        let doc = self.fetch_cached(bundle, key_ref.path(), cache).await?;
        let private_key = self.extract_field(bundle, &key_ref, doc, "private key");
        let private_key = self.settle(
            private_key,
            keystore.private_key.as_deref(),
            &key_ref,
            Slot::KeystorePrivateKey,
        )?;

        Ok(KeystoreConfig {
            certificate,
            private_key,
        })
    }

    /// Resolve a truststore slot.
    ///
    /// When the field was defaulted to `ca-certificate` and the secret has
    /// none, its `certificate` field is used instead, so one secret can serve
    /// as both server certificate and trust anchor.
    pub async fn resolve_truststore(
        &self,
        bundle: &str,
        truststore: &TruststoreConfig,
        cache: &mut DocumentCache,
    ) -> Result<TruststoreConfig> {
        let Some(expr) = truststore
            .certificate
            .as_deref()
            .filter(|v| self.parser.is_reference(v))
        else {
            return Ok(truststore.clone());
        };

        self.diagnostics
            .info(Event::new(bundle, "Loading truststore certificate from Vault"));

        let reference = self.parser.parse(expr, CA_CERTIFICATE_FIELD)?;
        let doc = self.fetch_cached(bundle, reference.path(), cache).await?;

        let mut certificate = self.extract_field(bundle, &reference, doc, "CA certificate");
        if certificate.is_none() && reference.field() == CA_CERTIFICATE_FIELD {
            certificate = self.extract_field(
                bundle,
                &reference.with_field(CERTIFICATE_FIELD),
                doc,
                "certificate (fallback for CA)",
            );
        }

        let certificate = match (certificate, self.policy.unresolved_field) {
            (Some(value), _) => Some(value),
            (None, UnresolvedFieldPolicy::Keep) => truststore.certificate.clone(),
            (None, UnresolvedFieldPolicy::Fail) => {
                self.diagnostics.warn(
                    Event::new(bundle, "No CA certificate resolved; truststore left empty")
                        .path(reference.path())
                        .field(reference.field()),
                );
                None
            }
        };

        Ok(TruststoreConfig { certificate })
    }

    /// Apply the unresolved-field policy to a keystore value.
    ///
    /// A configured literal survives a failed lookup; only a missing value or
    /// a leftover reference counts as unresolved.
    fn settle(
        &self,
        extracted: Option<String>,
        original: Option<&str>,
        reference: &SecretReference,
        slot: Slot,
    ) -> Result<Option<String>> {
        if extracted.is_some() {
            return Ok(extracted);
        }
        let original = original.filter(|v| !v.trim().is_empty());
        match (self.policy.unresolved_field, original) {
            (UnresolvedFieldPolicy::Keep, _) => Ok(original.map(str::to_string)),
            (UnresolvedFieldPolicy::Fail, Some(literal)) if !self.parser.is_reference(literal) => {
                Ok(Some(literal.to_string()))
            }
            (UnresolvedFieldPolicy::Fail, _) => Err(Error::UnresolvedField {
                slot,
                path: reference.path().to_string(),
                field: reference.field().to_string(),
            }),
        }
    }

    /// Look up `reference.field()` in `doc`.
    ///
    /// Missing and non-string fields are reported as warnings and yield
    /// `None`; they never fail the bundle at this layer.
    pub fn extract_field(
        &self,
        bundle: &str,
        reference: &SecretReference,
        doc: &SecretDocument,
        description: &str,
    ) -> Option<String> {
        let field = reference.field();
        match doc.lookup(field) {
            FieldLookup::Found(value) => Some(value.to_string()),
            FieldLookup::Missing => {
                self.diagnostics.warn(
                    Event::new(
                        bundle,
                        format!("Field '{field}' ({description}) not found in Vault data"),
                    )
                    .path(reference.path())
                    .field(field),
                );
                None
            }
            FieldLookup::NotAString(kind) => {
                self.diagnostics.warn(
                    Event::new(
                        bundle,
                        format!("Field '{field}' ({description}) is not a string in Vault data: {kind}"),
                    )
                    .path(reference.path())
                    .field(field),
                );
                None
            }
        }
    }

    /// Return the document for `path`, reading the store only on a miss.
    pub async fn fetch_cached<'c>(
        &self,
        bundle: &str,
        path: &str,
        cache: &'c mut DocumentCache,
    ) -> Result<&'c SecretDocument> {
        match cache.entry(path.to_string()) {
            Entry::Occupied(entry) => {
                self.diagnostics
                    .debug(Event::new(bundle, "Using cached Vault data").path(path));
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                self.diagnostics
                    .debug(Event::new(bundle, "Loading Vault data (not in cache)").path(path));
                let doc = self.fetch_document(bundle, path).await?;
                Ok(entry.insert(doc))
            }
        }
    }

    /// Read and normalize the document at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::SecretNotFound`] when the store has nothing at `path` or the
    /// payload is empty; [`Error::Store`] when the payload is not an object.
    pub async fn fetch_document(&self, bundle: &str, path: &str) -> Result<SecretDocument> {
        let raw = self
            .store
            .read(path)
            .await?
            .ok_or_else(|| Error::SecretNotFound {
                path: path.to_string(),
            })?;

        let fields = match raw {
            Value::Object(fields) => fields,
            Value::Null => {
                return Err(Error::SecretNotFound {
                    path: path.to_string(),
                });
            }
            other => {
                return Err(Error::Store {
                    path: path.to_string(),
                    message: format!("expected a JSON object, got {}", value_kind(&other)),
                });
            }
        };

        if fields.is_empty() {
            return Err(Error::SecretNotFound {
                path: path.to_string(),
            });
        }

        let doc = SecretDocument::normalize(fields);
        let shape = match doc.version() {
            KvVersion::V2 => "Detected KV v2 secret engine format",
            KvVersion::V1 => "Using KV v1 secret engine format",
        };
        self.diagnostics.debug(Event::new(bundle, shape).path(path));

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::diagnostics::{Level, RecordingDiagnostics};
    use crate::store::InMemorySecretStore;

    fn resolver(
        store: InMemorySecretStore,
    ) -> (
        BundleResolver,
        Arc<InMemorySecretStore>,
        Arc<RecordingDiagnostics>,
    ) {
        let store = Arc::new(store);
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let resolver = BundleResolver::new(store.clone()).with_diagnostics(diagnostics.clone());
        (resolver, store, diagnostics)
    }

    #[tokio::test]
    async fn fetch_cached_reads_once() {
        let (resolver, store, diagnostics) =
            resolver(InMemorySecretStore::new().with("secret/a", json!({ "certificate": "A" })));
        let mut cache = DocumentCache::new();

        resolver.fetch_cached("b", "secret/a", &mut cache).await.unwrap();
        let doc = resolver.fetch_cached("b", "secret/a", &mut cache).await.unwrap();

        assert_eq!(doc.lookup("certificate").value(), Some("A"));
        assert_eq!(store.reads("secret/a"), 1);
        assert!(
            diagnostics
                .at(Level::Debug)
                .iter()
                .any(|e| e.message == "Using cached Vault data")
        );
    }

    #[tokio::test]
    async fn fetch_document_missing_path() {
        let (resolver, _, _) = resolver(InMemorySecretStore::new());
        let err = resolver.fetch_document("b", "secret/none").await.unwrap_err();
        assert!(matches!(err, Error::SecretNotFound { ref path } if path == "secret/none"));
    }

    #[tokio::test]
    async fn fetch_document_empty_payload() {
        let (resolver, _, _) = resolver(InMemorySecretStore::new().with("secret/empty", json!({})));
        let err = resolver.fetch_document("b", "secret/empty").await.unwrap_err();
        assert!(matches!(err, Error::SecretNotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_document_rejects_non_object() {
        let (resolver, _, _) = resolver(InMemorySecretStore::new().with("secret/str", json!("pem")));
        let err = resolver.fetch_document("b", "secret/str").await.unwrap_err();
        assert!(err.to_string().contains("expected a JSON object, got string"));
    }

    #[tokio::test]
    async fn fetch_document_reports_shape() {
        let (resolver, _, diagnostics) = resolver(
            InMemorySecretStore::new()
                .with("kv2", json!({ "data": { "certificate": "X" }, "metadata": {} }))
                .with("kv1", json!({ "certificate": "X" })),
        );
        resolver.fetch_document("b", "kv2").await.unwrap();
        resolver.fetch_document("b", "kv1").await.unwrap();

        let debug: Vec<_> = diagnostics
            .at(Level::Debug)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert!(debug.contains(&"Detected KV v2 secret engine format".to_string()));
        assert!(debug.contains(&"Using KV v1 secret engine format".to_string()));
    }

    #[test]
    fn extract_field_warns_on_type_mismatch() {
        let (resolver, _, diagnostics) = resolver(InMemorySecretStore::new());
        let doc = SecretDocument::normalize(match json!({ "certificate": 7 }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        });
        let reference = SecretReference::new("secret/a", "certificate");

        assert_eq!(resolver.extract_field("b", &reference, &doc, "certificate"), None);

        let warnings = diagnostics.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("is not a string"));
        assert!(warnings[0].message.contains("number"));
        assert_eq!(warnings[0].field.as_deref(), Some("certificate"));
    }

    #[test]
    fn extract_field_warns_on_missing() {
        let (resolver, _, diagnostics) = resolver(InMemorySecretStore::new());
        let doc = SecretDocument::default();
        let reference = SecretReference::new("secret/a", "private-key");

        assert_eq!(resolver.extract_field("b", &reference, &doc, "private key"), None);
        assert!(diagnostics.warnings()[0].message.contains("not found"));
    }

    #[test]
    fn report_into_result() {
        let ok = ResolutionReport::default();
        assert!(ok.is_success());
        assert!(ok.into_result().unwrap().is_empty());

        let failed = ResolutionReport {
            failures: vec![Error::SecretNotFound { path: "p".into() }.in_bundle("x")],
            ..ResolutionReport::default()
        };
        assert_eq!(failed.failed_bundles().collect::<Vec<_>>(), ["x"]);
        assert!(matches!(failed.into_result(), Err(Error::Registration { .. })));
    }
}
