//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Resolve TLS certificate bundles from HashiCorp Vault
#[derive(Parser, Debug)]
#[command(name = "vault-ssl-bundle")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "VAULT_SSL_BUNDLE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "VAULT_SSL_BUNDLE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "VAULT_SSL_BUNDLE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Output format for `resolve`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON document
    Json,
    /// YAML document
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve every configured bundle and print the result
    Resolve {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Print PEM material instead of a redacted summary
        #[arg(long)]
        show_pem: bool,
    },

    /// Resolve, register and build TLS configs for every bundle
    Check,

    /// Show how a secret reference expression is parsed
    Parse {
        /// Expression, e.g. `vault:secret/data/ssl-certs/api:server_cert`
        #[arg(required = true)]
        expression: String,

        /// Field used when the expression names none
        #[arg(short, long, default_value = "certificate")]
        default_field: String,

        /// Reference prefix
        #[arg(short, long, default_value = "vault:")]
        prefix: String,
    },
}
