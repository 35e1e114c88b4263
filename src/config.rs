//! Configuration management

use std::{env, path::Path, time::Duration};

use bundle_core::DEFAULT_PREFIX;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bundle::PemBundles;
use crate::{Error, Result};

/// Prefix for environment overrides (`VAULT_SSL_BUNDLE_VAULT__ADDRESS`, ...)
pub const ENV_PREFIX: &str = "VAULT_SSL_BUNDLE_";

const DEFAULT_VAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Vault connection
    pub vault: VaultConfig,
    /// SSL bundle definitions
    pub ssl: SslConfig,
    /// Resolution policies
    pub resolution: ResolutionConfig,
}

/// Vault connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault address; falls back to `VAULT_ADDR`, then `http://127.0.0.1:8200`
    pub address: Option<String>,
    /// Token: literal value or `env:VAR_NAME`; falls back to `VAULT_TOKEN`
    pub token: Option<String>,
    /// Vault Enterprise namespace; falls back to `VAULT_NAMESPACE`
    pub namespace: Option<String>,
    /// HTTP request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Extra PEM CA bundle used to verify the Vault server
    pub ca_bundle: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            namespace: None,
            timeout: Duration::from_secs(15),
            ca_bundle: None,
        }
    }
}

impl VaultConfig {
    /// Address to connect to
    #[must_use]
    pub fn effective_address(&self) -> String {
        self.address
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| env::var("VAULT_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_VAULT_ADDRESS.to_string())
    }

    /// Namespace to send, if any
    #[must_use]
    pub fn effective_namespace(&self) -> Option<String> {
        self.namespace
            .clone()
            .or_else(|| env::var("VAULT_NAMESPACE").ok())
            .filter(|ns| !ns.trim().is_empty())
    }

    /// Resolve the token (expand `env:VAR`, fall back to `VAULT_TOKEN`)
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        match self.token.as_deref() {
            Some(token) => match token.strip_prefix("env:") {
                Some(var_name) => env::var(var_name).ok(),
                None => Some(token.to_string()),
            },
            None => env::var("VAULT_TOKEN").ok(),
        }
        .filter(|t| !t.trim().is_empty())
    }
}

/// SSL section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    /// Prefix marking a value as a Vault reference; blank means `vault:`
    pub prefix: String,
    /// Bundle definitions
    pub bundle: BundleSection,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            bundle: BundleSection::default(),
        }
    }
}

/// `ssl.bundle`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BundleSection {
    /// PEM bundles, in configuration order
    pub pem: PemBundles,
}

/// What a registration pass does when a bundle fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Attempt every bundle and report all failures together
    #[default]
    Collect,
    /// Stop at the first failed bundle
    FailFast,
}

/// What happens when a required field cannot be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedFieldPolicy {
    /// Keystore fields fail the bundle; an unresolved truststore is dropped
    #[default]
    Fail,
    /// Leave the original expression in place
    Keep,
}

/// Resolution policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Behaviour across bundles
    pub failure_policy: FailurePolicy,
    /// Behaviour for unresolved fields
    pub unresolved_field: UnresolvedFieldPolicy,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files first so ${VAR} expansion can see them
        config.load_env_files();
        config.expand_env_vars();

        Ok(config)
    }

    /// Parse configuration from a YAML string (no environment merge)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Figment::new()
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Configured PEM bundles
    #[must_use]
    pub fn bundles(&self) -> &PemBundles {
        &self.ssl.bundle.pem
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in Vault connection values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        for value in [
            &mut self.vault.address,
            &mut self.vault.namespace,
            &mut self.vault.ca_bundle,
        ]
        .into_iter()
        .flatten()
        {
            *value = Self::expand_string(&re, value);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}
