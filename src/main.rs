use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use citation_badges::badge::ShieldsClient;
use citation_badges::config;
use citation_badges::pipeline::{AuthorQuery, Pipeline, RunRequest};
use citation_badges::report;
use citation_badges::scholar::ScholarClient;
use citation_badges::store::{self, Store};
use citation_badges::webdriver::WebDriverLauncher;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch citation and peer review counts and render them as badges"
)]
struct Args {
    /// Author name to search on Google Scholar
    #[arg(long)]
    author: Option<String>,

    /// Google Scholar author id; skips the name search and wins over --author
    #[arg(long)]
    scholar_id: Option<String>,

    /// Web of Science researcher id; Web of Science is skipped when omitted
    #[arg(long)]
    wos: Option<String>,

    /// Write a markdown summary of the run
    #[arg(long)]
    summary: bool,

    /// Path to YAML config file; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `app.output_dir`
    #[arg(long)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir.clone() {
        cfg.app.output_dir = dir;
    }
    cfg.ensure_dirs()?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("citation-badges/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;
    let scholar = ScholarClient::from_config(http.clone(), &cfg)?;
    let browser = WebDriverLauncher::from_config(http.clone(), &cfg)?;
    let badges = ShieldsClient::from_config(http, &cfg)?;

    let request = RunRequest {
        author: AuthorQuery::from_args(args.author.as_deref(), args.scholar_id.as_deref()),
        wos_id: args.wos.clone().filter(|id| !id.trim().is_empty()),
    };
    let pipeline = Pipeline::new(&cfg, &scholar, &browser, &badges);
    let outcome = pipeline.run(&request).await;

    let store = Store::from_config(&cfg);
    let previous = store.load_previous().await;
    let (snapshot, updated) = store::merge(
        previous.as_ref(),
        outcome.scholar.clone(),
        outcome.wos.clone(),
    );
    match store.persist(&snapshot, updated, previous.is_some()).await {
        Ok(persisted) => info!(
            updated = persisted.updated,
            snapshot_written = persisted.snapshot_written,
            "reconciliation complete"
        ),
        Err(err) => {
            error!(?err, "failed to persist snapshot");
            store.write_flag_best_effort(false).await;
            return Err(err);
        }
    }

    if args.summary {
        let summary = report::render(&outcome.scholar, &outcome.wos, request.wos_id.is_some());
        let path = cfg.app.summary_path();
        tokio::fs::write(&path, &summary)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    Ok(())
}
