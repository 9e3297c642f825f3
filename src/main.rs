// src/main.rs
//! harcap
//!
//! Profiles a page in Chromium and writes a HAR archive, a performance trace
//! and a Lighthouse report for it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use harcap::observability::init_tracing;
use harcap::runtime::{convert_file, run};
use harcap::utils::config::{CaptureConfig, CompletionCondition, ConfigOverrides, LogFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "harcap", version, about = "Capture HAR, trace and Lighthouse report for a page")]
struct Cli {
    /// Configuration file (defaults to ./harcap.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Profile a page
    Capture(CaptureArgs),

    /// Convert a saved event log to HAR without a browser
    Convert {
        /// JSON array of {"method", "params"} notifications
        input: PathBuf,

        /// Output file (defaults to the input with a .har extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Page to profile
    url: Option<String>,

    /// Chromium executable
    #[arg(long)]
    executable: Option<PathBuf>,

    /// Close the capture window once a response URL contains this text
    #[arg(long, conflicts_with = "until_selector")]
    until_response: Option<String>,

    /// Close the capture window once this CSS selector matches
    #[arg(long)]
    until_selector: Option<String>,

    /// Root directory for run artifacts
    #[arg(short, long)]
    output_root: Option<PathBuf>,

    /// Capture window timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Lighthouse executable
    #[arg(long)]
    lighthouse: Option<PathBuf>,

    /// Do not run Lighthouse
    #[arg(long)]
    skip_audit: bool,

    /// Start profiling without waiting for Enter
    #[arg(long)]
    no_wait: bool,
}

impl CaptureArgs {
    fn overrides(self, log_json: bool) -> ConfigOverrides {
        let completion_condition = match (self.until_response, self.until_selector) {
            (Some(pattern), _) => Some(CompletionCondition::ResponseUrlContains(pattern)),
            (None, Some(selector)) => Some(CompletionCondition::SelectorAppears(selector)),
            (None, None) => None,
        };

        ConfigOverrides {
            executable_path: self.executable,
            target_url: self.url,
            completion_condition,
            output_root: self.output_root,
            capture_timeout_secs: self.timeout,
            headless: self.headless.then_some(true),
            lighthouse_path: self.lighthouse,
            skip_audit: self.skip_audit.then_some(true),
            skip_gate: self.no_wait.then_some(true),
            log_format: log_json.then_some(LogFormat::Json),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Convert { input, output } => {
            init_tracing(log_format(cli.log_json))?;
            let output = output.unwrap_or_else(|| input.with_extension("har"));

            let export = convert_file(&input, &output)
                .await
                .with_context(|| format!("Failed to convert {}", input.display()))?;

            for group in &export.dropped {
                warn!("Dropped request {}: {}", group.request_id, group.reason);
            }
            info!("Wrote {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Capture(args) => capture(cli.config, args, cli.log_json).await,
    }
}

async fn capture(config_path: Option<PathBuf>, args: CaptureArgs, log_json: bool) -> Result<ExitCode> {
    let config = match CaptureConfig::load(config_path.as_deref(), args.overrides(log_json)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_code(e.exit_code()));
        }
    };
    init_tracing(config.log_format)?;

    info!("Starting harcap v{} for {}", harcap::VERSION, config.target_url);

    let outcome = run(&config).await;
    if let harcap::RunOutcome::Success(artifacts) = &outcome {
        println!("{}", artifacts.directory.display());
    }
    Ok(exit_code(outcome.exit_code()))
}

fn log_format(json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
