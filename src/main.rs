//! Vault SSL Bundle - resolve TLS certificate bundles from HashiCorp Vault

use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use vault_ssl_bundle::{
    ReferenceParser,
    bundle::PemBundleConfig,
    cli::{Cli, Command, OutputFormat},
    config::Config,
    registry::{SslBundleRegistry, VaultSslBundleRegistrar},
    resolver::{BundleResolver, ResolutionReport},
    setup_tracing,
    store::VaultClient,
};

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Parse {
            ref expression,
            ref default_field,
            ref prefix,
        } => run_parse(expression, default_field, prefix),
        Command::Resolve { format, show_pem } => run_resolve(&cli, format, show_pem).await,
        Command::Check => run_check(&cli).await,
    }
}

/// Show how an expression parses
fn run_parse(expression: &str, default_field: &str, prefix: &str) -> ExitCode {
    let parser = ReferenceParser::new(prefix);
    if !parser.is_reference(expression) {
        println!("Literal value (no '{}' prefix) - passed through unchanged", parser.prefix());
        return ExitCode::SUCCESS;
    }
    match parser.parse(expression, default_field) {
        Ok(reference) => {
            println!("Path:  {}", reference.path());
            println!("Field: {}", reference.field());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load config and build a resolver backed by Vault
fn build_resolver(cli: &Cli) -> Option<(Config, Arc<BundleResolver>)> {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("❌ {e}");
            return None;
        }
    };

    let client = match VaultClient::from_config(&config.vault) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Vault client: {e}");
            eprintln!("❌ {e}");
            return None;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        vault = %client.base_url(),
        bundles = config.bundles().len(),
        "Resolving SSL bundles"
    );

    let resolver = BundleResolver::new(Arc::new(client))
        .with_prefix(&config.ssl.prefix)
        .with_policy(config.resolution);
    Some((config, Arc::new(resolver)))
}

/// Resolve bundles and print them
async fn run_resolve(cli: &Cli, format: OutputFormat, show_pem: bool) -> ExitCode {
    let Some((config, resolver)) = build_resolver(cli) else {
        return ExitCode::FAILURE;
    };

    if config.bundles().is_empty() {
        println!("No PEM bundles configured.");
        return ExitCode::SUCCESS;
    }

    let report = resolver.resolve_all(config.bundles()).await;
    let summary = ReportSummary::new(&report, show_pem);

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Yaml => match serde_yaml::to_string(&summary) {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize to YAML: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => print_summary(&summary),
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Resolve, register and build TLS configs
async fn run_check(cli: &Cli) -> ExitCode {
    let Some((config, resolver)) = build_resolver(cli) else {
        return ExitCode::FAILURE;
    };

    let registry = SslBundleRegistry::with_loader(Arc::clone(&resolver));
    let registrar = VaultSslBundleRegistrar::new(resolver);
    let report = registrar.register(config.bundles(), &registry).await;

    let mut ok = report.is_success();
    for failure in &report.failures {
        eprintln!("❌ {failure}");
    }
    for name in &report.skipped {
        eprintln!("⏭  {name} - skipped");
    }

    for name in registry.names() {
        let Ok(bundle) = registry.get(&name) else {
            continue;
        };
        let mut checks = Vec::new();
        if bundle.has_keystore() {
            checks.push(bundle.server_config().map(|_| "server"));
        }
        if bundle.has_truststore() {
            checks.push(bundle.client_config().map(|_| "client"));
        }

        let mut built = Vec::new();
        for check in checks {
            match check {
                Ok(kind) => built.push(kind),
                Err(e) => {
                    ok = false;
                    eprintln!("❌ {name}: {e}");
                }
            }
        }
        if !built.is_empty() {
            println!("✅ {name} - {} TLS config", built.join(" + "));
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[derive(Debug, Serialize)]
struct ReportSummary {
    resolved: Vec<BundleSummary>,
    failed: Vec<FailureSummary>,
    skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BundleSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ca_certificate: Option<String>,
}

#[derive(Debug, Serialize)]
struct FailureSummary {
    bundle: Option<String>,
    error: String,
}

impl ReportSummary {
    fn new(report: &ResolutionReport, show_pem: bool) -> Self {
        Self {
            resolved: report
                .resolved
                .iter()
                .map(|(name, bundle)| BundleSummary::new(name, bundle, show_pem))
                .collect(),
            failed: report
                .failures
                .iter()
                .map(|e| FailureSummary {
                    bundle: e.bundle().map(str::to_string),
                    error: e.to_string(),
                })
                .collect(),
            skipped: report.skipped.clone(),
        }
    }
}

impl BundleSummary {
    fn new(name: &str, bundle: &PemBundleConfig, show_pem: bool) -> Self {
        let describe = |value: Option<&str>| value.map(|v| describe_value(v, show_pem));
        Self {
            name: name.to_string(),
            certificate: describe(bundle.keystore_certificate()),
            private_key: describe(bundle.keystore_private_key()),
            ca_certificate: describe(bundle.truststore_certificate()),
        }
    }
}

/// Redacted one-line description of a PEM value
fn describe_value(value: &str, show_pem: bool) -> String {
    if show_pem {
        return value.to_string();
    }
    let blocks = value.matches("-----BEGIN ").count();
    if blocks == 0 {
        format!("<not PEM, {} bytes>", value.len())
    } else {
        format!("<{blocks} PEM block(s), {} bytes>", value.len())
    }
}

fn print_summary(summary: &ReportSummary) {
    for bundle in &summary.resolved {
        println!("📦 {}", bundle.name);
        if let Some(ref cert) = bundle.certificate {
            println!("   Certificate:    {cert}");
        }
        if let Some(ref key) = bundle.private_key {
            println!("   Private key:    {key}");
        }
        if let Some(ref ca) = bundle.ca_certificate {
            println!("   CA certificate: {ca}");
        }
        println!();
    }

    for failure in &summary.failed {
        println!("❌ {}", failure.error);
    }
    for name in &summary.skipped {
        println!("⏭  {name} - skipped");
    }
}
