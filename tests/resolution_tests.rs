//! Resolution engine integration tests

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use vault_ssl_bundle::Error;
use vault_ssl_bundle::bundle::{PemBundleConfig, PemBundles, Slot};
use vault_ssl_bundle::config::{FailurePolicy, ResolutionConfig, UnresolvedFieldPolicy};
use vault_ssl_bundle::diagnostics::{Level, RecordingDiagnostics};
use vault_ssl_bundle::resolver::BundleResolver;
use vault_ssl_bundle::store::InMemorySecretStore;

struct Harness {
    resolver: BundleResolver,
    store: Arc<InMemorySecretStore>,
    diagnostics: Arc<RecordingDiagnostics>,
}

fn harness(store: InMemorySecretStore) -> Harness {
    harness_with_policy(store, ResolutionConfig::default())
}

fn harness_with_policy(store: InMemorySecretStore, policy: ResolutionConfig) -> Harness {
    let store = Arc::new(store);
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let resolver = BundleResolver::new(store.clone())
        .with_diagnostics(diagnostics.clone())
        .with_policy(policy);
    Harness {
        resolver,
        store,
        diagnostics,
    }
}

fn bundles(entries: Vec<(&str, PemBundleConfig)>) -> PemBundles {
    entries
        .into_iter()
        .map(|(name, bundle)| (name.to_string(), bundle))
        .collect()
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn implicit_private_key_from_kv2_secret() {
    // GIVEN: a keystore referencing one KV v2 secret, no explicit private key
    let h = harness(InMemorySecretStore::new().with(
        "secret/data/ssl/svc",
        json!({
            "data": { "certificate": "CERT", "private-key": "KEY" },
            "metadata": { "version": 3 }
        }),
    ));
    let config = bundles(vec![(
        "svc",
        PemBundleConfig::keystore("vault:secret/data/ssl/svc", None),
    )]);

    // WHEN: resolving
    let report = h.resolver.resolve_all(&config).await;

    // THEN: both values come from the same secret, read once
    assert!(report.is_success());
    let svc = &report.resolved["svc"];
    assert_eq!(svc.keystore_certificate(), Some("CERT"));
    assert_eq!(svc.keystore_private_key(), Some("KEY"));
    assert_eq!(h.store.reads("secret/data/ssl/svc"), 1);
    assert_eq!(h.store.total_reads(), 1);
}

#[tokio::test]
async fn distinct_paths_with_custom_fields() {
    let h = harness(
        InMemorySecretStore::new()
            .with("pki/cert/api", json!({ "server_cert": "API-CERT", "server_key": "WRONG" }))
            .with("pki/key/api", json!({ "server_key": "API-KEY", "server_cert": "WRONG" })),
    );
    let config = bundles(vec![(
        "api",
        PemBundleConfig::keystore(
            "vault:pki/cert/api:server_cert",
            Some("vault:pki/key/api:server_key".to_string()),
        ),
    )]);

    let report = h.resolver.resolve_all(&config).await;

    let api = &report.resolved["api"];
    assert_eq!(api.keystore_certificate(), Some("API-CERT"));
    assert_eq!(api.keystore_private_key(), Some("API-KEY"));
    assert_eq!(h.store.reads("pki/cert/api"), 1);
    assert_eq!(h.store.reads("pki/key/api"), 1);
    assert_eq!(h.store.total_reads(), 2);
}

#[tokio::test]
async fn truststore_only_falls_back_to_certificate_field() {
    // GIVEN: a KV v1 secret with no ca-certificate field
    let h = harness(
        InMemorySecretStore::new().with("secret/data/ca/trusted", json!({ "certificate": "CACERT" })),
    );
    let config = bundles(vec![(
        "client",
        PemBundleConfig::truststore("vault:secret/data/ca/trusted"),
    )]);

    // WHEN
    let report = h.resolver.resolve_all(&config).await;

    // THEN: the certificate field is used as the trust anchor
    let client = &report.resolved["client"];
    assert!(client.keystore.is_none());
    assert_eq!(client.truststore_certificate(), Some("CACERT"));

    // The missing ca-certificate is still reported
    let warnings = h.diagnostics.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field.as_deref(), Some("ca-certificate"));
    assert_eq!(warnings[0].bundle, "client");
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn keystore_and_truststore_share_one_read() {
    let h = harness(InMemorySecretStore::new().with(
        "secret/data/ssl/both",
        json!({ "data": { "certificate": "C", "private-key": "K", "ca-certificate": "CA" } }),
    ));
    let config = bundles(vec![(
        "both",
        PemBundleConfig::keystore("vault:secret/data/ssl/both", None)
            .with_truststore("vault:secret/data/ssl/both"),
    )]);

    let report = h.resolver.resolve_all(&config).await;

    let both = &report.resolved["both"];
    assert_eq!(both.keystore_certificate(), Some("C"));
    assert_eq!(both.keystore_private_key(), Some("K"));
    assert_eq!(both.truststore_certificate(), Some("CA"));
    assert_eq!(h.store.reads("secret/data/ssl/both"), 1);
}

#[tokio::test]
async fn cache_does_not_span_bundles() {
    let h = harness(
        InMemorySecretStore::new()
            .with("secret/shared", json!({ "certificate": "C", "private-key": "K" })),
    );
    let config = bundles(vec![
        ("one", PemBundleConfig::keystore("vault:secret/shared", None)),
        ("two", PemBundleConfig::keystore("vault:secret/shared", None)),
    ]);

    let report = h.resolver.resolve_all(&config).await;

    assert_eq!(report.resolved.len(), 2);
    assert_eq!(h.store.reads("secret/shared"), 2);
}

#[tokio::test]
async fn explicit_truststore_field_has_no_fallback() {
    let h = harness(InMemorySecretStore::new().with("secret/ca", json!({ "certificate": "Y" })));
    let config = bundles(vec![(
        "client",
        PemBundleConfig::truststore("vault:secret/ca:root"),
    )]);

    let report = h.resolver.resolve_all(&config).await;

    // Unresolved truststore is dropped, not failed
    assert!(report.is_success());
    assert_eq!(report.resolved["client"].truststore_certificate(), None);
    assert!(
        h.diagnostics
            .warnings()
            .iter()
            .any(|e| e.message.contains("truststore left empty"))
    );
}

#[tokio::test]
async fn literal_values_never_reach_the_store() {
    let h = harness(InMemorySecretStore::new());
    let literal = PemBundleConfig::keystore(
        "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----",
        Some("vault:never/read".to_string()),
    )
    .with_truststore("-----BEGIN CERTIFICATE-----\nMIIC\n-----END CERTIFICATE-----");
    let config = bundles(vec![("static", literal.clone())]);

    let report = h.resolver.resolve_all(&config).await;

    assert_eq!(report.resolved["static"], literal);
    assert_eq!(h.store.total_reads(), 0);
}

#[tokio::test]
async fn broken_bundle_does_not_hide_healthy_one() {
    let h = harness(
        InMemorySecretStore::new().with("secret/b", json!({ "certificate": "B", "private-key": "BK" })),
    );
    let config = bundles(vec![
        ("a", PemBundleConfig::keystore("vault:secret/missing", None)),
        ("b", PemBundleConfig::keystore("vault:secret/b", None)),
    ]);

    let report = h.resolver.resolve_all(&config).await;

    assert_eq!(report.failed_bundles().collect::<Vec<_>>(), ["a"]);
    assert!(matches!(
        &report.failures[0],
        Error::BundleResolution { source, .. } if matches!(**source, Error::SecretNotFound { .. })
    ));
    assert_eq!(report.resolved["b"].keystore_certificate(), Some("B"));
    assert_eq!(report.resolved["b"].keystore_private_key(), Some("BK"));
    assert!(!report.resolved.contains_key("a"));

    let errors = h.diagnostics.at(Level::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].bundle, "a");
}

#[tokio::test]
async fn input_configuration_is_left_untouched() {
    let h = harness(
        InMemorySecretStore::new().with("secret/svc", json!({ "certificate": "C", "private-key": "K" })),
    );
    let config = bundles(vec![("svc", PemBundleConfig::keystore("vault:secret/svc", None))]);
    let before = config.clone();

    let _ = h.resolver.resolve_all(&config).await;

    assert_eq!(config, before);
}

// ============================================================================
// Failure policies
// ============================================================================

#[tokio::test]
async fn collect_policy_reports_every_failure() {
    let h = harness(InMemorySecretStore::new());
    let config = bundles(vec![
        ("a", PemBundleConfig::keystore("vault:secret/a", None)),
        ("b", PemBundleConfig::keystore("vault:secret/b", None)),
    ]);

    let report = h.resolver.resolve_all(&config).await;

    assert_eq!(report.failed_bundles().collect::<Vec<_>>(), ["a", "b"]);
    assert!(report.skipped.is_empty());

    let err = report.into_result().unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("2 SSL bundle(s) failed to load"));
    assert!(msg.contains("'a'"));
    assert!(msg.contains("'b'"));
}

#[tokio::test]
async fn fail_fast_policy_skips_remaining_bundles() {
    let h = harness_with_policy(
        InMemorySecretStore::new().with("secret/c", json!({ "certificate": "C", "private-key": "K" })),
        ResolutionConfig {
            failure_policy: FailurePolicy::FailFast,
            ..ResolutionConfig::default()
        },
    );
    let config = bundles(vec![
        ("a", PemBundleConfig::keystore("vault:secret/a", None)),
        ("b", PemBundleConfig::keystore("vault:secret/b", None)),
        ("c", PemBundleConfig::keystore("vault:secret/c", None)),
    ]);

    let report = h.resolver.resolve_all(&config).await;

    assert_eq!(report.failed_bundles().collect::<Vec<_>>(), ["a"]);
    assert_eq!(report.skipped, ["b", "c"]);
    assert!(report.resolved.is_empty());
    assert_eq!(h.store.reads("secret/c"), 0);
}

#[tokio::test]
async fn missing_private_key_fails_bundle() {
    let h = harness(InMemorySecretStore::new().with("secret/svc", json!({ "certificate": "C" })));
    let config = bundles(vec![("svc", PemBundleConfig::keystore("vault:secret/svc", None))]);

    let report = h.resolver.resolve_all(&config).await;

    let Error::BundleResolution { bundle, source } = &report.failures[0] else {
        panic!("expected bundle failure, got {:?}", report.failures);
    };
    assert_eq!(bundle, "svc");
    match source.as_ref() {
        Error::UnresolvedField { slot, path, field } => {
            assert_eq!(*slot, Slot::KeystorePrivateKey);
            assert_eq!(path, "secret/svc");
            assert_eq!(field, "private-key");
        }
        other => panic!("expected UnresolvedField, got {other:?}"),
    }
}

#[tokio::test]
async fn keep_policy_leaves_expression_in_place() {
    let h = harness_with_policy(
        InMemorySecretStore::new().with("secret/svc", json!({ "certificate": "C" })),
        ResolutionConfig {
            unresolved_field: UnresolvedFieldPolicy::Keep,
            ..ResolutionConfig::default()
        },
    );
    let config = bundles(vec![(
        "svc",
        PemBundleConfig::keystore("vault:secret/svc", Some("vault:secret/svc:tls-key".to_string()))
            .with_truststore("vault:secret/svc:root"),
    )]);

    let report = h.resolver.resolve_all(&config).await;

    let svc = &report.resolved["svc"];
    assert_eq!(svc.keystore_certificate(), Some("C"));
    assert_eq!(svc.keystore_private_key(), Some("vault:secret/svc:tls-key"));
    assert_eq!(svc.truststore_certificate(), Some("vault:secret/svc:root"));
}

#[tokio::test]
async fn literal_private_key_survives_failed_lookup() {
    let h = harness(InMemorySecretStore::new().with("secret/svc", json!({ "certificate": "C" })));
    let config = bundles(vec![(
        "svc",
        PemBundleConfig::keystore("vault:secret/svc", Some("LITERAL-KEY".to_string())),
    )]);

    let report = h.resolver.resolve_all(&config).await;

    assert!(report.is_success());
    assert_eq!(report.resolved["svc"].keystore_private_key(), Some("LITERAL-KEY"));
}

// ============================================================================
// Reference and payload errors
// ============================================================================

#[tokio::test]
async fn bare_prefix_is_an_invalid_reference() {
    let h = harness(InMemorySecretStore::new());
    let config = bundles(vec![("bad", PemBundleConfig::keystore("vault:", None))]);

    let report = h.resolver.resolve_all(&config).await;

    assert!(matches!(
        &report.failures[0],
        Error::BundleResolution { bundle, source }
            if bundle == "bad" && matches!(**source, Error::InvalidReference(_))
    ));
    assert_eq!(h.store.total_reads(), 0);
}

#[tokio::test]
async fn non_string_field_is_warned_then_unresolved() {
    let h = harness(InMemorySecretStore::new().with(
        "secret/svc",
        json!({ "data": { "certificate": ["not", "a", "string"], "private-key": "K" } }),
    ));
    let config = bundles(vec![("svc", PemBundleConfig::keystore("vault:secret/svc", None))]);

    let report = h.resolver.resolve_all(&config).await;

    assert!(matches!(
        &report.failures[0],
        Error::BundleResolution { source, .. }
            if matches!(**source, Error::UnresolvedField { slot: Slot::KeystoreCertificate, .. })
    ));
    let warnings = h.diagnostics.warnings();
    assert!(warnings[0].message.contains("is not a string"));
    assert!(warnings[0].message.contains("array"));
}

#[tokio::test]
async fn custom_prefix_is_honoured() {
    let store = Arc::new(
        InMemorySecretStore::new().with("kv/svc", json!({ "certificate": "C", "private-key": "K" })),
    );
    let resolver = BundleResolver::new(store.clone())
        .with_prefix("secret://")
        .with_diagnostics(Arc::new(RecordingDiagnostics::new()));
    let config = bundles(vec![
        ("svc", PemBundleConfig::keystore("secret://kv/svc", None)),
        ("other", PemBundleConfig::keystore("vault:kv/svc", Some("K".to_string()))),
    ]);

    let report = resolver.resolve_all(&config).await;

    assert_eq!(report.resolved["svc"].keystore_certificate(), Some("C"));
    // Default prefix is a literal under a custom prefix
    assert_eq!(report.resolved["other"].keystore_certificate(), Some("vault:kv/svc"));
    assert_eq!(store.total_reads(), 1);
}

#[tokio::test]
async fn resolved_bundles_keep_configuration_order() {
    let h = harness(
        InMemorySecretStore::new()
            .with("s/z", json!({ "certificate": "Z", "private-key": "ZK" }))
            .with("s/a", json!({ "certificate": "A", "private-key": "AK" })),
    );
    let config = bundles(vec![
        ("zeta", PemBundleConfig::keystore("vault:s/z", None)),
        ("alpha", PemBundleConfig::keystore("vault:s/a", None)),
    ]);

    let report = h.resolver.resolve_all(&config).await;

    let names: Vec<_> = report.resolved.keys().map(String::as_str).collect();
    assert_eq!(names, ["zeta", "alpha"]);
}
