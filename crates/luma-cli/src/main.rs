use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use luma_contracts::events::EventWriter;
use luma_contracts::prompts::{classify, plan_strategy};
use luma_contracts::providers::ProviderRegistry;
use luma_contracts::{VisionConfig, VisionError};
use luma_engine::{AnalysisRequest, VisionOrchestrator, DEFAULT_USER_PROMPT};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "luma", version, about = "Ask vision models about images")]
struct Cli {
    /// Only log warnings and errors.
    #[arg(long, short, global = true)]
    quiet: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze an image with the configured provider.
    Analyze(AnalyzeArgs),
    /// Show how a prompt would be classified and planned.
    Classify(ClassifyArgs),
    /// List known providers.
    Providers,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Local path, http(s) URL or data URI.
    #[arg(long)]
    image: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    no_thinking: bool,
    /// Append a JSONL trace of the analysis to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print a `{content, isError}` envelope instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct ClassifyArgs {
    #[arg(long)]
    prompt: String,
    /// Tile count to plan against.
    #[arg(long, default_value_t = 0)]
    tiles: usize,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("luma error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(&cli);
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Classify(args) => run_classify(args),
        Command::Providers => run_providers(),
    }
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = VisionConfig::from_env().context("invalid configuration")?;
    let mut orchestrator = VisionOrchestrator::from_config(config)?;
    if let Some(path) = &args.events {
        orchestrator = orchestrator.with_events(EventWriter::new(path));
    }

    let request = AnalysisRequest {
        image_source: args.image,
        prompt: args
            .prompt
            .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string()),
        enable_thinking: args.no_thinking.then_some(false),
    };
    let result = orchestrator.analyze(&request);

    if args.json {
        let code = i32::from(result.is_err());
        println!("{}", serde_json::to_string_pretty(&envelope(&result))?);
        return Ok(code);
    }
    let text = result?;
    println!("{text}");
    Ok(0)
}

fn envelope(result: &Result<String, VisionError>) -> Value {
    let (text, is_error) = match result {
        Ok(text) => (text.clone(), false),
        Err(err) => (format!("错误: {err}"), true),
    };
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error,
    })
}

fn run_classify(args: ClassifyArgs) -> Result<i32> {
    let profile = classify(&args.prompt);
    let plan = plan_strategy(&profile, args.tiles);
    let report = json!({
        "prompt": args.prompt,
        "profile": profile,
        "plan": plan,
        "backend_calls": plan.backend_calls(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn run_providers() -> Result<i32> {
    let registry = ProviderRegistry::default();
    for spec in registry.list() {
        println!(
            "{:<12} {:<9} {:<32} {:<20} {}s",
            spec.tag.as_str(),
            spec.label,
            spec.default_model,
            spec.api_key_env,
            spec.timeout.as_secs()
        );
    }
    Ok(0)
}
