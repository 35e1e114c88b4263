//! HashiCorp Vault HTTP client.
//!
//! Reads `GET {address}/v1/{path}` with `X-Vault-Token` (and
//! `X-Vault-Namespace` when configured) and hands back the response's
//! top-level `data` object. For KV v2 mounts that object still contains the
//! nested `data` / `metadata` pair; normalization happens in the engine.

use std::fs;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::SecretStore;
use crate::config::VaultConfig;
use crate::{Error, Result};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Vault read client.
#[derive(Debug, Clone)]
pub struct VaultClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<Value>,
}

impl VaultClient {
    /// Build a client from the `vault` configuration block.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid URL, the CA bundle
    /// cannot be read or parsed, or the HTTP client cannot be built.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(ref path) = config.ca_bundle {
            let pem = fs::read(path)
                .map_err(|e| Error::Config(format!("Cannot read Vault CA bundle '{path}': {e}")))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("Invalid Vault CA bundle '{path}': {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build Vault HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url(&config.effective_address())?,
            token: config.resolve_token(),
            namespace: config.effective_namespace(),
        })
    }

    /// Build a client for `address` with default HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is not a valid URL.
    pub fn new(address: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: parse_base_url(address)?,
            token,
            namespace: None,
        })
    }

    /// Send requests to a Vault Enterprise namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let relative = format!("v1/{}", path.trim_start_matches('/'));
        self.base_url.join(&relative).map_err(|e| Error::Store {
            path: path.to_string(),
            message: format!("invalid request URL: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl SecretStore for VaultClient {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url_for(path)?;
        debug!(path = path, "Reading secret from Vault");

        let mut request = self.client.get(url);
        if let Some(ref token) = self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(ref namespace) = self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }

        let response = request.send().await.map_err(|e| Error::Store {
            path: path.to_string(),
            message: format!("request failed: {e}"),
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::FORBIDDEN => Err(Error::PermissionDenied {
                path: path.to_string(),
            }),
            status if status.is_success() => {
                let body: ReadResponse = response.json().await.map_err(|e| Error::Store {
                    path: path.to_string(),
                    message: format!("failed to decode Vault response: {e}"),
                })?;
                Ok(body.data)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Store {
                    path: path.to_string(),
                    message: format!("{status} {}", body.trim()),
                })
            }
        }
    }
}

/// Parse a Vault address, making sure it ends in `/` so `join` appends.
fn parse_base_url(address: &str) -> Result<Url> {
    let mut normalized = address.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| Error::Config(format!("Invalid Vault address '{address}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "Unsupported Vault address scheme '{other}' in '{address}'"
        ))),
    }
}
