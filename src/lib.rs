//! Vault SSL Bundle Library
//!
//! Resolves TLS certificate bundles whose PEM values are references into
//! HashiCorp Vault KV secrets.
//!
//! # Features
//!
//! - **Reference grammar**: `vault:<path>` or `vault:<path>:<field>`, with
//!   context-dependent default fields
//! - **KV v1 and v2**: payload shape detected on every read
//! - **One read per path**: per-bundle document cache
//! - **Fallbacks**: implicit private key from the certificate's secret,
//!   truststore falling back from `ca-certificate` to `certificate`
//! - **Bundle isolation**: one broken bundle never hides the others
//! - **rustls**: resolved bundles build server and client TLS configs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bundle;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod store;

pub use bundle_core::{
    FieldLookup, KvVersion, ReferenceError, ReferenceParser, SecretDocument, SecretReference,
};
pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
        }
        _ => {
            subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
        }
    }

    Ok(())
}
