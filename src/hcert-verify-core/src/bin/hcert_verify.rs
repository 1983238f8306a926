//! hcert-verify CLI - verify HC1/AT1 health certificates.
//!
//! Maintains the signed dataset cache and checks certificates against it.
//! Output is JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hcert_verify_core::{decode_any, HcertEngine, VerifyConfig, VerifyError};
use serde::Serialize;
use serde_json::json;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// hcert-verify - health certificate verification.
///
/// Datasets (trust lists, business rules, value sets) are fetched from the
/// configured publisher, verified against the pinned trust anchor and
/// cached encrypted under the cache directory.
#[derive(Parser)]
#[command(name = "hcert-verify")]
#[command(version = VERSION)]
#[command(about = "Verify HC1/AT1 health certificates")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Directory for the encrypted dataset cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Trust anchor file (DER certificate, DER public key or SEC1 point)
    #[arg(long)]
    anchor: Option<PathBuf>,

    /// API token sent as X-Token
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every dataset
    Update {
        /// Ignore the update interval
        #[arg(long)]
        force: bool,
    },

    /// Verify a certificate against the cached trust list
    Verify {
        /// Certificate text, e.g. HC1:...
        code: String,

        /// Verify an AT1 exemption certificate against the national trust list
        #[arg(long)]
        exemption: bool,
    },

    /// Decode a certificate without checking its signature
    Decode {
        /// Certificate text
        code: String,
    },

    /// Show dataset freshness
    Status,
}

fn build_engine(cli: &Cli) -> Result<HcertEngine, VerifyError> {
    let anchor_path = cli.anchor.as_ref().ok_or_else(|| VerifyError::ConfigError {
        message: "--anchor is required for this command".into(),
    })?;
    let trust_anchor = std::fs::read(anchor_path).map_err(|e| VerifyError::ConfigError {
        message: format!("read {}: {e}", anchor_path.display()),
    })?;

    let config = VerifyConfig {
        trust_anchor,
        api_token: cli.token.clone(),
        cache_dir: cli.cache_dir.clone(),
        ..VerifyConfig::default()
    };
    HcertEngine::from_config(config)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error: failed to serialize output: {e}"),
    }
}

/// JSON report for `decode`; an undecodable certificate is a result, not
/// a usage error.
fn decode_report(code: &str) -> (serde_json::Value, bool) {
    match decode_any(code) {
        Ok(decoded) => (
            json!({
                "scheme": decoded.scheme,
                "type": decoded.claims.certificate_type(),
                "meta": decoded.meta,
                "claims": decoded.claims,
            }),
            true,
        ),
        Err(e) => (json!({ "error": e.to_string() }), false),
    }
}

async fn run(cli: &Cli) -> Result<bool, VerifyError> {
    match &cli.command {
        Commands::Update { force } => {
            let mut engine = build_engine(cli)?;
            let outcome = engine.update_all(*force).await;
            print_json(&json!({
                "changed": outcome.changed,
                "error": outcome.error.as_ref().map(ToString::to_string),
                "datasets": engine.status(),
            }));
            Ok(outcome.error.is_none())
        },
        Commands::Verify { code, exemption } => {
            let engine = build_engine(cli)?;
            let verdict = if *exemption {
                engine.verify_exemption(code)
            } else {
                engine.verify(code)
            };
            print_json(&verdict);
            Ok(verdict.is_valid)
        },
        Commands::Decode { code } => {
            let (report, decoded) = decode_report(code);
            print_json(&report);
            Ok(decoded)
        },
        Commands::Status => {
            let engine = build_engine(cli)?;
            print_json(&engine.status());
            Ok(true)
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        },
    }
}
