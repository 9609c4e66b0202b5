//! dentcode-ai - Dental/medical coding assistant CLI
//!
//! Reads a clinical scenario (argument, file or stdin), runs the coding
//! pipeline and prints the report as pretty JSON. With `--interactive`,
//! clarifying questions from the inspector are asked on the terminal and the
//! revised report is printed after each answer.

use anyhow::{Context, Result};
use clap::Parser;
use dentcode_ai::config::resolve_llm_api_key;
use dentcode_ai::{CodingPipeline, CodingReport};
use dentcode_common::config::{write_toml_config, ConfigResolver};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use tracing::info;

/// Module name used for config file resolution
const MODULE_NAME: &str = "dentcode-ai";

/// Command-line arguments for dentcode-ai
#[derive(Parser, Debug)]
#[command(name = "dentcode-ai")]
#[command(about = "Suggest CDT and ICD-10 codes for a clinical scenario")]
#[command(version)]
struct Args {
    /// Clinical scenario text (read from stdin when neither this nor --file is given)
    scenario: Option<String>,

    /// Read the scenario from a file
    #[arg(short, long, conflicts_with = "scenario")]
    file: Option<PathBuf>,

    /// Config file (overrides DENTCODE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ask the inspector's clarifying questions on the terminal
    #[arg(short, long)]
    interactive: bool,

    /// Model name (overrides [llm] model)
    #[arg(short, long, env = "DENTCODE_LLM_MODEL")]
    model: Option<String>,

    /// Write the effective config to this path and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(MODULE_NAME);
    let loaded = resolver.load(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing (RUST_LOG wins over the config file)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting dentcode-ai v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = loaded.context("Failed to load configuration")?;
    match resolver.resolve(args.config.as_deref()) {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    if let Some(model) = args.model {
        config.llm.model = model;
    }

    if let Some(path) = &args.write_config {
        write_toml_config(&config, path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Config written to {}", path.display());
        return Ok(());
    }

    let scenario = read_scenario(args.scenario, args.file.as_ref())?;
    let api_key = resolve_llm_api_key(&config);
    let pipeline =
        CodingPipeline::from_config(&config, api_key).context("Failed to build coding pipeline")?;

    let mut report = pipeline.analyze(&scenario).await?;
    print_report(&report)?;

    if args.interactive {
        while let Some(question) = report.pending_question() {
            let Some(answer) = ask(question)? else {
                break;
            };
            report = pipeline.clarify(&report, &answer).await?;
            print_report(&report)?;
        }
    }

    Ok(())
}

fn read_scenario(arg: Option<String>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {}", path.display()));
    }

    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read scenario from stdin")?;
    Ok(text)
}

fn print_report(report: &CodingReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}

/// Prompt on stderr; `None` on EOF or a blank answer
fn ask(question: &str) -> Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "\n{}\n> ", question)?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}
