//! PEM bundle definitions.
//!
//! These mirror the `ssl.bundle.pem` configuration block. Each value is
//! either literal PEM text or a secret reference such as
//! `vault:secret/data/ssl-certs/server-a`.
//!
//! ```yaml
//! ssl:
//!   bundle:
//!     pem:
//!       server-a:
//!         keystore:
//!           certificate: "vault:secret/data/ssl-certs/server-a"
//!       server-b:
//!         keystore:
//!           certificate: "vault:secret/data/ssl-certs/server-b:certificate"
//!           private-key: "vault:secret/data/ssl-certs/server-b:private-key"
//!         truststore:
//!           certificate: "vault:secret/data/ssl-certs/server-b:ca-certificate"
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Bundles by name, in configuration order.
pub type PemBundles = IndexMap<String, PemBundleConfig>;

/// One named PEM bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PemBundleConfig {
    /// Server (or client) certificate and private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keystore: Option<KeystoreConfig>,

    /// Trust anchors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truststore: Option<TruststoreConfig>,
}

/// Keystore slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct KeystoreConfig {
    /// Certificate PEM or reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Private key PEM or reference.
    ///
    /// When the certificate is a reference and this is not, the key is read
    /// from the certificate's secret path under the `private-key` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// Truststore slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruststoreConfig {
    /// CA certificate PEM or reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl PemBundleConfig {
    /// Bundle with only a keystore.
    #[must_use]
    pub fn keystore(certificate: impl Into<String>, private_key: Option<String>) -> Self {
        Self {
            keystore: Some(KeystoreConfig {
                certificate: Some(certificate.into()),
                private_key,
            }),
            truststore: None,
        }
    }

    /// Bundle with only a truststore.
    #[must_use]
    pub fn truststore(certificate: impl Into<String>) -> Self {
        Self {
            keystore: None,
            truststore: Some(TruststoreConfig {
                certificate: Some(certificate.into()),
            }),
        }
    }

    /// Add a truststore to this bundle.
    #[must_use]
    pub fn with_truststore(mut self, certificate: impl Into<String>) -> Self {
        self.truststore = Some(TruststoreConfig {
            certificate: Some(certificate.into()),
        });
        self
    }

    /// Keystore certificate value, if configured.
    #[must_use]
    pub fn keystore_certificate(&self) -> Option<&str> {
        self.keystore.as_ref()?.certificate.as_deref()
    }

    /// Keystore private key value, if configured.
    #[must_use]
    pub fn keystore_private_key(&self) -> Option<&str> {
        self.keystore.as_ref()?.private_key.as_deref()
    }

    /// Truststore certificate value, if configured.
    #[must_use]
    pub fn truststore_certificate(&self) -> Option<&str> {
        self.truststore.as_ref()?.certificate.as_deref()
    }
}

/// Keystore slot a required value belongs to.
///
/// The truststore has no entry: an unresolved CA certificate is dropped,
/// never failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// `keystore.certificate`
    KeystoreCertificate,
    /// `keystore.private-key`
    KeystorePrivateKey,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeystoreCertificate => "keystore certificate",
            Self::KeystorePrivateKey => "keystore private key",
        })
    }
}
