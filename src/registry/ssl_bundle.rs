//! Resolved SSL bundles and rustls config building.
//!
//! All material is held as in-memory **PEM** text, exactly as read from
//! Vault or the configuration file.

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tracing::debug;

use crate::bundle::PemBundleConfig;
use crate::{Error, Result};

/// A named bundle of literal PEM material.
#[derive(Clone, PartialEq, Eq)]
pub struct SslBundle {
    name: String,
    certificate: Option<String>,
    private_key: Option<String>,
    ca_certificate: Option<String>,
}

impl fmt::Debug for SslBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslBundle")
            .field("name", &self.name)
            .field("certificate", &self.certificate.as_ref().map(String::len))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("ca_certificate", &self.ca_certificate.as_ref().map(String::len))
            .finish()
    }
}

impl SslBundle {
    /// Build a bundle from its PEM parts.
    pub fn new(
        name: impl Into<String>,
        certificate: Option<String>,
        private_key: Option<String>,
        ca_certificate: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            certificate,
            private_key,
            ca_certificate,
        }
    }

    /// Build a bundle from a resolved configuration entry.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &PemBundleConfig) -> Self {
        Self::new(
            name,
            config.keystore_certificate().map(str::to_string),
            config.keystore_private_key().map(str::to_string),
            config.truststore_certificate().map(str::to_string),
        )
    }

    /// Bundle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keystore certificate PEM.
    #[must_use]
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    /// Keystore private key PEM.
    #[must_use]
    pub fn private_key_pem(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// Truststore certificate PEM.
    #[must_use]
    pub fn ca_certificate_pem(&self) -> Option<&str> {
        self.ca_certificate.as_deref()
    }

    /// `true` if a keystore certificate is present.
    #[must_use]
    pub fn has_keystore(&self) -> bool {
        self.certificate.is_some()
    }

    /// `true` if a truststore certificate is present.
    #[must_use]
    pub fn has_truststore(&self) -> bool {
        self.ca_certificate.is_some()
    }

    /// Parse the keystore certificate chain.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no keystore certificate or it holds no
    /// valid PEM certificate block.
    pub fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>> {
        let pem = self.certificate.as_deref().ok_or_else(|| {
            Error::Tls(format!("Bundle '{}' has no keystore certificate", self.name))
        })?;
        parse_certs(pem, &self.name, "keystore certificate")
    }

    /// Parse the keystore private key.
    ///
    /// Supports RSA (`RSA PRIVATE KEY`), PKCS#8 (`PRIVATE KEY`), and EC keys.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no key or it cannot be parsed.
    pub fn private_key(&self) -> Result<PrivateKeyDer<'static>> {
        let pem = self.private_key.as_deref().ok_or_else(|| {
            Error::Tls(format!("Bundle '{}' has no keystore private key", self.name))
        })?;
        rustls_pemfile::private_key(&mut pem.as_bytes())
            .map_err(|e| {
                Error::Tls(format!(
                    "Failed to parse private key of bundle '{}': {e}",
                    self.name
                ))
            })?
            .ok_or_else(|| Error::Tls(format!("No private key found in bundle '{}'", self.name)))
    }

    /// Trust anchors from the truststore certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no truststore certificate or a
    /// certificate cannot be added as a trust anchor.
    pub fn root_store(&self) -> Result<RootCertStore> {
        let pem = self.ca_certificate.as_deref().ok_or_else(|| {
            Error::Tls(format!("Bundle '{}' has no truststore certificate", self.name))
        })?;
        let mut roots = RootCertStore::empty();
        for cert in parse_certs(pem, &self.name, "truststore certificate")? {
            roots.add(cert).map_err(|e| {
                Error::Tls(format!(
                    "Failed to add CA cert of bundle '{}' to trust store: {e}",
                    self.name
                ))
            })?;
        }
        Ok(roots)
    }

    /// Build a `rustls::ServerConfig`.
    ///
    /// With a truststore, clients must present a certificate signed by it;
    /// without one, client authentication is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM material cannot be parsed or rustls
    /// rejects it (e.g. mismatched cert/key pair).
    pub fn server_config(&self) -> Result<ServerConfig> {
        let certs = self.certificate_chain()?;
        let key = self.private_key()?;

        let builder = ServerConfig::builder();
        let builder = if self.has_truststore() {
            let verifier = WebPkiClientVerifier::builder(Arc::new(self.root_store()?))
                .build()
                .map_err(|e| Error::Tls(format!("Failed to build client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let config = builder
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(format!("TLS config error (cert/key mismatch?): {e}")))?;

        debug!(
            bundle = %self.name,
            client_auth = self.has_truststore(),
            "Server TLS config built"
        );
        Ok(config)
    }

    /// Build a `rustls::ClientConfig` trusting the truststore certificate.
    ///
    /// When the bundle also has a keystore it is offered as the client
    /// certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle has no truststore or the PEM material
    /// cannot be used.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder().with_root_certificates(self.root_store()?);

        let config = if self.has_keystore() {
            builder
                .with_client_auth_cert(self.certificate_chain()?, self.private_key()?)
                .map_err(|e| Error::Tls(format!("Client certificate rejected: {e}")))?
        } else {
            builder.with_no_client_auth()
        };

        debug!(
            bundle = %self.name,
            client_auth = self.has_keystore(),
            "Client TLS config built"
        );
        Ok(config)
    }
}

fn parse_certs(pem: &str, bundle: &str, what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse {what} of bundle '{bundle}': {e}")))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "No certificates found in {what} of bundle '{bundle}'"
        )));
    }
    Ok(certs)
}
