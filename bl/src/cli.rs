//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{OutputType, RunMode};

/// Benchloop - bounded tool-use agent loop for benchmark tasks
#[derive(Parser)]
#[command(
    name = "bl",
    about = "Run benchmark tasks through a bounded tool-use loop, normalize artifacts and score tool quality",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one task and emit its report
    Run {
        /// Task JSON file
        #[arg(short, long)]
        task: PathBuf,

        /// Workspace directory the tools are confined to
        #[arg(short, long)]
        workspace: PathBuf,

        /// Run mode (patch_only, tools_enabled); overrides the config
        #[arg(short, long)]
        mode: Option<RunMode>,

        /// Append the report as one JSON line to this file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append per-call telemetry rows (JSON lines) to this file
        #[arg(long)]
        telemetry: Option<PathBuf>,
    },

    /// Aggregate task reports (JSON lines) into a run summary
    Score {
        /// Reports file written by `bl run --output`
        reports: PathBuf,
    },

    /// Normalize an artifact and print the policy result
    Normalize {
        /// Expected output type (patch, json, text)
        #[arg(short = 't', long = "type", default_value = "text")]
        output_type: OutputType,

        /// Artifact file (reads stdin when absent)
        file: Option<PathBuf>,
    },

    /// Print the tool schemas offered to the model
    Schemas,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("benchloop")
        .join("logs")
        .join("benchloop.log");
    debug!(?path, "get_log_path: returning path");
    path
}
