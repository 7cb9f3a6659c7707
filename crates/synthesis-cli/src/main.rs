//! synthesize: Run the synthesis engine over a batch of card outputs.
//!
//! Reads a JSON array of card outputs from a file (or stdin) and prints the
//! synthesis result as JSON. Engine settings come from `SYNTHESIS_*` env vars.
//!
//! Usage:
//!   cargo run -p synthesis-cli -- cards.json
//!   cat cards.json | cargo run -p synthesis-cli -- -
//!   cargo run -p synthesis-cli -- cards.json --compact

use std::io::Read;

use anyhow::{bail, Context};
use synthesis_engine::{SynthesisConfig, SynthesisEngine};

const USAGE: &str = "usage: synthesize <cards.json | -> [--compact]";

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let compact = args.iter().any(|a| a == "--compact");
    let inputs: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let source = match inputs.as_slice() {
        [source] => source.as_str(),
        _ => bail!(USAGE),
    };

    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read card batch from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };
    let batch: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", source))?;

    let config = SynthesisConfig::from_env()?;
    let engine = SynthesisEngine::new(config)?;
    let result = engine.synthesize_value(&batch)?;

    if result.is_degraded() {
        tracing::warn!(
            "Synthesis for {} is degraded: {} diagnostics",
            result.symbol,
            result.diagnostics.len()
        );
    }

    let output = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", output);
    Ok(())
}
