//! # Topic Digest
//!
//! A three-stage content-curation pipeline: fetch recent news articles for a
//! list of topics, score their relevance with an LLM, and draft a markdown
//! digest of social-media post ideas grouped by topic.
//!
//! ## Usage
//!
//! ```sh
//! # one local run; digest lands in ideas_output.md
//! topic_digest run --days 7
//!
//! # HTTP trigger; each request runs the chained pipeline against BUCKET_NAME
//! topic_digest serve --port 8080
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: one search per topic, up to 6 in flight, merged and
//!    de-duplicated by URL
//! 2. **Scoring**: batches of 20 articles scored in JSON mode, kept when the
//!    score meets the threshold
//! 3. **Digest**: surviving articles grouped by topic and turned into post
//!    ideas by the model
//!
//! Each stage can persist its output (`raw/`, `filtered/`, `ideas/`) to a
//! blob store: a GCS bucket or a local directory.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod digest;
mod error;
mod fetcher;
mod models;
mod pipeline;
mod scorer;
mod server;
mod sources;
mod storage;
#[cfg(test)]
mod testing;
mod utils;

use api::OpenAiChat;
use cli::{Cli, Command, RunArgs, ServeArgs};
use config::{Settings, check_threshold};
use pipeline::Pipeline;
use sources::newsapi::NewsApiClient;
use storage::BlobStore;
use storage::gcs::GcsBlobStore;
use storage::local::LocalBlobStore;
use utils::{ensure_writable_dir, preview};

/// Characters of the digest echoed to stdout after a local run.
const PREVIEW_CHARS: usize = 1500;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("topic_digest starting up");

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut settings = Settings::load(args.config.as_deref()).inspect_err(|e| {
        error!(error = %e, "Invalid settings");
    })?;

    match args.command {
        Command::Run(run) => run_once(&mut settings, run).await?,
        Command::Serve(serve) => serve_trigger(&mut settings, serve).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn override_threshold(settings: &mut Settings, threshold: Option<f64>) -> error::Result<()> {
    if let Some(t) = threshold {
        check_threshold(t)?;
        settings.threshold = t;
    }
    Ok(())
}

/// Build the production clients from `settings` and wire them into a pipeline.
fn build_pipeline(
    settings: &Settings,
    store: Option<Arc<dyn BlobStore>>,
) -> error::Result<Pipeline> {
    let search = NewsApiClient::new(&settings.news_api_key, &settings.news_api_url)?;
    let llm = OpenAiChat::new(
        &settings.openai_api_key,
        &settings.model,
        &settings.openai_base_url,
        Duration::from_secs(settings.llm_timeout_secs),
    )?;
    info!(model = llm.model(), topics = settings.topics.len(), "Clients ready");
    Ok(Pipeline::new(settings, Arc::new(search), Arc::new(llm), store))
}

async fn run_once(settings: &mut Settings, run: RunArgs) -> Result<(), Box<dyn Error>> {
    override_threshold(settings, run.threshold)?;

    let store: Option<Arc<dyn BlobStore>> = match (&run.store_dir, &run.bucket) {
        (Some(dir), _) => Some(Arc::new(LocalBlobStore::new(dir))),
        (None, Some(bucket)) => Some(Arc::new(GcsBlobStore::connect(bucket).await?)),
        (None, None) => None,
    };

    let outdir = match run.outfile.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    if let Err(e) = ensure_writable_dir(&outdir).await {
        error!(path = %outdir, error = %e, "Output directory is not writable");
        return Err(e);
    }

    let pipeline = build_pipeline(settings, store)?;
    let mut opts = pipeline.default_options();
    if let Some(days) = run.days {
        opts.days_back = days;
    }
    opts.filter = !run.no_filter;
    let report = pipeline.run_in_memory(opts).await?;

    tokio::fs::write(&run.outfile, &report.digest).await?;
    info!(path = %run.outfile.display(), bytes = report.digest.len(), "Wrote digest");

    println!("Saved ideas to {}", run.outfile.display());
    println!("{}", preview(&report.digest, PREVIEW_CHARS));
    Ok(())
}

async fn serve_trigger(settings: &mut Settings, serve: ServeArgs) -> Result<(), Box<dyn Error>> {
    override_threshold(settings, serve.threshold)?;

    let store: Arc<dyn BlobStore> = match (&serve.store_dir, &settings.bucket_name) {
        (Some(dir), _) => Arc::new(LocalBlobStore::new(dir)),
        (None, Some(bucket)) => Arc::new(GcsBlobStore::connect(bucket).await?),
        (None, None) => {
            let e = error::PipelineError::Config(
                "BUCKET_NAME is not set (or pass --store-dir)".to_string(),
            );
            error!(error = %e, "No blob store configured");
            return Err(e.into());
        }
    };
    info!(location = %store.location(), "Stage artifacts location");

    let pipeline = build_pipeline(settings, Some(store))?;
    let addr = format!("{}:{}", serve.host, serve.port);
    server::serve(Arc::new(pipeline), &addr).await?;
    Ok(())
}
