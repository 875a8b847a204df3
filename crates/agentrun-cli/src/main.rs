//! agentrun - run coding-agent tasks through Codex, Claude, Gemini or opencode.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentrun_cli::{
    parse_batch, render_single, render_text, BatchDefaults, Config, JsonReport, Orchestrator,
};
use agentrun_core::{BackendKind, TaskId, TaskSpec};
use agentrun_sdk::{TaskRunner, TokioCommandRunner};

/// agentrun - one interface over several coding-agent CLIs
#[derive(Parser)]
#[command(name = "agentrun", version)]
#[command(about = "Run coding-agent tasks across Codex, Claude, Gemini and opencode", long_about = None)]
struct Cli {
    /// Task text; "-" reads it from stdin. Not used with --parallel
    task: Option<String>,

    /// Working directory for the backend
    workdir: Option<PathBuf>,

    /// Backend: codex, claude, gemini or opencode
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Resume the given session instead of starting a new one
    #[arg(short = 'r', long, value_name = "SESSION_ID")]
    resume: Option<String>,

    /// Read a batch description from stdin and run its tasks concurrently
    #[arg(long, conflicts_with_all = ["task", "resume"])]
    parallel: bool,

    /// Set the input-channel flag; the task text stays a positional argument
    #[arg(long)]
    stdin: bool,

    /// Per-task timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Maximum concurrently running tasks in batch mode (0 = unbounded)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Model passed to the backend
    #[arg(short, long)]
    model: Option<String>,

    /// Print the single-task outcome as JSON
    #[arg(long, conflicts_with = "parallel")]
    json: bool,

    /// Print the batch report as text instead of JSON
    #[arg(long, requires = "parallel")]
    text: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    if let Some(secs) = cli.timeout {
        config.timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(max_parallel) = cli.max_parallel {
        config.max_parallel = max_parallel;
    }
    if let Some(backend) = cli.backend {
        config.default_backend = backend;
    }
    if cli.model.is_some() {
        config.model = cli.model.clone();
    }

    info!(
        backend = %config.default_backend,
        bypass_sandbox = config.bypass_sandbox,
        timeout_secs = config.timeout.as_secs(),
        "Starting agentrun"
    );

    let runner = TaskRunner::new(std::sync::Arc::new(TokioCommandRunner))
        .with_options(config.backend_options())
        .with_timeout(Some(config.timeout));
    let orchestrator = Orchestrator::new(runner).with_max_parallel(config.max_parallel);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running tasks");
                cancel.cancel();
            }
        });
    }

    let work_dir = cli.workdir.clone().unwrap_or_else(|| PathBuf::from("."));

    if cli.parallel {
        let input = read_stdin().await?;
        let defaults = BatchDefaults {
            backend: config.default_backend,
            work_dir,
            use_stdin: cli.stdin,
        };
        let entries = parse_batch(&input, &defaults);
        if entries.is_empty() {
            return Err("no '---TASK---' blocks found on stdin".into());
        }

        let report = orchestrator.run_batch(entries, cancel).await;
        let rendered = if cli.text {
            render_text(&report)
        } else {
            let mut json = JsonReport::new(&report).to_json()?;
            json.push('\n');
            json
        };
        write_stdout(&rendered)?;

        return Ok(if report.all_succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let task = match cli.task.as_deref() {
        Some("-") => read_stdin().await?,
        Some(task) => task.to_string(),
        None => return Err("a task is required (or use --parallel)".into()),
    };

    let mut spec = TaskSpec::new(TaskId::generate(), config.default_backend, task)
        .with_work_dir(work_dir)
        .with_stdin(cli.stdin);
    if let Some(session_id) = cli.resume {
        spec = spec.resuming(session_id);
    }

    let outcome = orchestrator.run_single(&spec, cancel).await;

    if cli.json {
        let mut json = serde_json::to_string_pretty(&outcome)?;
        json.push('\n');
        write_stdout(&json)?;
    } else {
        write_stdout(&render_single(&outcome))?;
        if !outcome.error.is_empty() {
            eprintln!("Error: {}", outcome.error);
        }
    }

    Ok(exit_code(outcome.exit_code))
}

async fn read_stdin() -> std::io::Result<String> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

fn write_stdout(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

/// Map an outcome's exit code onto the process exit status.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
