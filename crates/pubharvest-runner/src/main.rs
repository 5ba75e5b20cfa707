//! pubharvest — multi-category literature harvester.
//! Entry point for the command-line binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use pubharvest_common::HarvestConfig;
use pubharvest_ingestion::Harvester;

const LOG_FILE: &str = "download_log.txt";

/// Stderr plus an ANSI-free copy in `{base_dir}/download_log.txt`.
/// Returns the log file error, if any, so it can be reported once logging is up.
fn init_logging(base_dir: &Path) -> Option<std::io::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pubharvest=info,info"));

    let log_file = std::fs::create_dir_all(base_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(base_dir.join(LOG_FILE))
    });
    let (file_layer, file_error) = match log_file {
        Ok(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    file_error
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loaded = HarvestConfig::load();
    let base_dir = loaded
        .as_ref()
        .map(|c| c.harvest.base_dir.clone())
        .unwrap_or_else(|_| HarvestConfig::default().harvest.base_dir);

    if let Some(e) = init_logging(&base_dir) {
        warn!(error = %e, "file logging disabled");
    }

    info!("pubharvest {} starting", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            error!("Could not load configuration: {e}");
            return Err(e).context("loading pubharvest.toml");
        }
    };
    info!(
        base = %config.harvest.base_dir.display(),
        categories = config.categories.len(),
        target = config.harvest.papers_per_category,
        email = %config.harvest.contact_email,
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            on_interrupt.cancel();
        }
    });

    let harvester = Harvester::new(config).context("building HTTP client")?;
    let summary = harvester.run(cancel).await.context("harvest run")?;

    info!("Run {} finished in {:.1}s", summary.run_id, summary.duration_ms as f64 / 1000.0);
    info!("  Papers:           {}", summary.records.len());
    info!("  Already on disk:  {}", summary.total_existing());
    info!("  Newly downloaded: {}", summary.total_new());
    info!("  Failed:           {}", summary.total_failed());
    for stats in summary
        .stats
        .iter()
        .filter(|s| s.closed_short || s.cancelled || s.error.is_some())
    {
        warn!(
            category = %stats.key,
            total = stats.total,
            target = stats.target,
            error = stats.error.as_deref().unwrap_or(""),
            "category below target"
        );
    }
    if summary.cancelled {
        warn!("run was interrupted; rerun to resume");
    }
    Ok(())
}
