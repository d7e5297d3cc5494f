//! Benchloop - bounded tool-use agent loop
//!
//! CLI entry point for running tasks, normalizing artifacts and scoring runs.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use clap::Parser;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use benchloop::artifact;
use benchloop::cli::{Cli, Command, get_log_path};
use benchloop::config::Config;
use benchloop::domain::{OutputType, RunMode, Task};
use benchloop::llm::create_client;
use benchloop::runner::{TaskReport, TaskRunner, score_reports};
use benchloop::tools::ToolExecutor;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            task,
            workspace,
            mode,
            output,
            telemetry,
        } => cmd_run(config, &task, &workspace, mode, output.as_deref(), telemetry.as_deref()).await,
        Command::Score { reports } => cmd_score(&config, &reports),
        Command::Normalize { output_type, file } => cmd_normalize(output_type, file.as_deref()),
        Command::Schemas => cmd_schemas(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn append_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    debug!(?path, rows = rows.len(), "append_jsonl: called");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open {}", path.display()))?;
    for row in rows {
        let line = serde_json::to_string(row).context("Failed to serialize row")?;
        writeln!(file, "{}", line).context(format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

async fn cmd_run(
    config: Config,
    task_path: &Path,
    workspace: &Path,
    mode: Option<RunMode>,
    output: Option<&Path>,
    telemetry: Option<&Path>,
) -> Result<()> {
    debug!(?task_path, ?workspace, ?mode, "cmd_run: called");
    let content = fs::read_to_string(task_path).context(format!("Failed to read task {}", task_path.display()))?;
    let task: Task = serde_json::from_str(&content).context("Failed to parse task JSON")?;

    if !workspace.is_dir() {
        return Err(eyre::eyre!("Workspace {} is not a directory", workspace.display()));
    }

    let run_id = uuid::Uuid::now_v7().to_string();
    info!(%run_id, task_id = %task.task_id, "cmd_run: starting");

    let client = create_client(&config.llm).context("Failed to create LLM client")?;
    let mut runner = TaskRunner::new(config, client);
    if let Some(mode) = mode {
        runner = runner.with_mode(mode);
    }

    let report: TaskReport = runner.run_task(&task, workspace).await?;

    if let Some(path) = telemetry {
        append_jsonl(path, &report.tool_call_rows(&run_id))?;
    }

    eprintln!("{}", report.quality);
    eprintln!(
        "artifact_valid={} artifact_reason={}",
        report.artifact_policy.valid, report.artifact_policy.reason
    );

    match output {
        Some(path) => append_jsonl(path, std::slice::from_ref(&report)),
        None => print_json(&report),
    }
}

fn cmd_score(config: &Config, reports_path: &Path) -> Result<()> {
    debug!(?reports_path, "cmd_score: called");
    let file = fs::File::open(reports_path).context(format!("Failed to open {}", reports_path.display()))?;

    let mut reports = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read reports file")?;
        if line.trim().is_empty() {
            continue;
        }
        let report: TaskReport =
            serde_json::from_str(&line).context(format!("Invalid report on line {}", index + 1))?;
        reports.push(report);
    }

    let summary = score_reports(&reports, config);
    eprintln!("{}", summary);
    print_json(&summary)
}

fn cmd_normalize(output_type: OutputType, file: Option<&Path>) -> Result<()> {
    debug!(%output_type, ?file, "cmd_normalize: called");
    let raw = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    print_json(&artifact::normalize(&raw, output_type))
}

fn cmd_schemas() -> Result<()> {
    debug!("cmd_schemas: called");
    let schemas: Vec<_> = ToolExecutor::definitions()
        .iter()
        .map(|definition| definition.to_openai_schema())
        .collect();
    print_json(&schemas)
}

