//! Command-line surface (§6): `build` and `prune`, plus the global
//! logging/timeout flags shared by both. Generalizes the teacher's
//! hand-rolled arg handling in `main.rs` into a proper derive-based CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "simplestream-imagebuilder",
    version,
    about = "Builds and prunes a Simplestreams-compatible image repository"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub logformat: LogFormat,

    /// Minimum log level emitted.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub loglevel: LogLevel,

    /// Abort the whole invocation after this many seconds; 0 disables the timeout.
    #[arg(long, default_value_t = 0, global = true)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover new versions, generate deltas, hash, and publish the catalog/index.
    Build(BuildArgs),
    /// Apply quota/age retention and the dangling-version sweep, then republish.
    Prune(PruneArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Repository root directory.
    pub root: PathBuf,

    /// Label for the published `streams/<label>/` directory.
    #[arg(long, default_value = "v1")]
    pub stream_version: String,

    /// Stream directory name to process; repeatable. Defaults to `images`.
    #[arg(long = "image-dir", value_name = "NAME")]
    pub image_dirs: Vec<String>,

    /// Worker thread count for the build pipeline.
    #[arg(long, default_value_t = default_workers())]
    pub workers: usize,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Repository root directory.
    pub root: PathBuf,

    /// Label for the published `streams/<label>/` directory.
    #[arg(long, default_value = "v1")]
    pub stream_version: String,

    /// Stream directory name to process; repeatable. Defaults to `images`.
    #[arg(long = "image-dir", value_name = "NAME")]
    pub image_dirs: Vec<String>,

    /// Keep this many newest complete versions per product; must be >= 1 when given.
    #[arg(long)]
    pub retain_builds: Option<usize>,

    /// Age-based retention cutoff in days; 0 disables it.
    #[arg(long, default_value_t = 0)]
    pub retain_days: u64,

    /// Also sweep on-disk versions not referenced by the catalog.
    #[arg(long, default_value_t = false)]
    pub dangling: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| (n.get() / 2).max(1)).unwrap_or(1)
}
