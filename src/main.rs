//! Lead discovery CLI (binary entrypoint).
//! Loads config, runs one discovery pass over the selected source and writes
//! the ranked CSV export.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opsidius_leads::config::ENV_CONFIG_PATH;
use opsidius_leads::{
    build_adapter, export_filename, save_to_file, to_delimited_text, Aggregator, LeadsConfig,
    ScrapeOptions, SourceKind,
};

#[derive(Debug, Parser)]
#[command(name = "opsidius-leads", version, about = "Rank newly registered businesses without a website")]
struct Cli {
    /// Recency window in days.
    #[arg(short, long, default_value_t = 30)]
    days: u32,

    /// Maximum number of ranked companies.
    #[arg(short, long, default_value_t = 50)]
    limit: usize,

    /// Single partition (department code); defaults to the configured region.
    #[arg(long = "dept")]
    department: Option<String>,

    /// Keep only companies whose city contains this text.
    #[arg(long)]
    city: Option<String>,

    /// registry | html | keyed
    #[arg(long, default_value = "registry")]
    source: SourceKind,

    /// Config file (TOML or JSON).
    #[arg(long, env = ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    /// Export directory; overrides the config.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

/// `RUST_LOG` wins; otherwise info for this crate, warn for the rest.
/// `LEADS_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opsidius_leads=info,leads=info,warn"));
    let json = std::env::var("LEADS_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(p) => LeadsConfig::load_from(p)?,
        None => LeadsConfig::load_default()?,
    };
    if let Some(dir) = cli.output_dir.clone() {
        cfg.output_dir = dir;
    }

    let opts = ScrapeOptions::new(cli.days, cli.limit)?
        .with_partition(cli.department.clone())
        .with_city(cli.city.clone());

    let today = Utc::now().date_naive();
    let adapter = build_adapter(cli.source, &cfg, &opts, today)?;
    let aggregator = Aggregator::from_config(adapter, &cfg)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing with what was collected");
                cancel.cancel();
            }
        });
    }

    let started = std::time::Instant::now();
    let report = aggregator.run(&opts, &cancel).await;
    let companies = &report.companies;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        ranked = companies.len(),
        high_score = companies.iter().filter(|c| c.score >= 60).count(),
        partitions_ok = report.partitions_ok,
        partitions_failed = report.partitions_failed,
        cancelled = report.cancelled,
        "discovery complete"
    );

    if companies.is_empty() {
        warn!(days = opts.days, "no recent companies found; try a wider --days or a single --dept");
        return Ok(());
    }

    for (i, c) in companies.iter().take(10).enumerate() {
        info!(
            rank = i + 1,
            score = c.score,
            name = %c.name,
            city = %c.city,
            postal_code = %c.postal_code,
            sector = %c.sector_label,
            created_at = %c.created_at,
            registry_id = %c.registry_id,
            "top lead"
        );
    }

    let scope = opts.partition.as_deref().unwrap_or(cfg.region_name.as_str());
    let filename = export_filename(today, scope);
    let path = save_to_file(&cfg.output_dir, &filename, &to_delimited_text(companies))
        .context("writing CSV export")?;
    info!(path = %path.display(), "exported");

    Ok(())
}
