//! Command-line interface definitions.
//!
//! Two subcommands: `run` performs one local pipeline run and writes the
//! digest to a file; `serve` starts the HTTP trigger used in deployment.
//! Credentials and pipeline settings come from the environment (see
//! [`crate::config::Settings`]); flags here only override per-invocation knobs.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Fetch the last 3 days, filter, and write ideas_output.md
/// topic_digest run --days 3
///
/// # Skip relevance filtering, keep artifacts in ./artifacts
/// topic_digest run --no-filter --store-dir ./artifacts
///
/// # Serve the HTTP trigger against the bucket in BUCKET_NAME
/// topic_digest serve --port 8080
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true, env = "TOPIC_DIGEST_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline once and save the digest locally
    Run(RunArgs),
    /// Serve the HTTP trigger; every request runs the chained pipeline
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Days to look back (defaults to DAYS_BACK / settings)
    #[arg(long)]
    pub days: Option<u32>,

    /// Skip LLM relevance filtering
    #[arg(long)]
    pub no_filter: bool,

    /// Minimum relevance score in [0, 1]
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Where to write the digest markdown
    #[arg(short, long, default_value = "ideas_output.md")]
    pub outfile: PathBuf,

    /// Also persist stage artifacts to this directory
    #[arg(long, conflicts_with = "bucket")]
    pub store_dir: Option<String>,

    /// Also persist stage artifacts to this GCS bucket
    #[arg(long)]
    pub bucket: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Minimum relevance score in [0, 1]
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Use a local directory instead of the GCS bucket
    #[arg(long)]
    pub store_dir: Option<String>,
}
