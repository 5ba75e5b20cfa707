//! Full-text retrieval.
//!
//! A [`RetrievalEngine`] walks an ordered chain of [`FetchStrategy`]
//! implementations until one yields a validated PDF. A failing strategy
//! never stops the chain; only a failed write to disk does.

pub mod europepmc;
pub mod filename;
pub mod pmc;
pub mod unpaywall;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use pubharvest_common::{HarvestClient, HarvestConfig, HarvestError, Result, Service};

use crate::models::{DownloadStatus, PaperRecord};
use crate::persist::write_atomic;
use crate::sources::idconv::IdConverter;

pub use filename::{document_filename, pmid_from_filename};

/// Bytes that must appear near the start of a PDF.
const PDF_MAGIC: &[u8] = b"%PDF";
const MAGIC_WINDOW: usize = 1024;

/// Body longer than `min_bytes` with `%PDF` in its first KiB.
pub fn validate_pdf(body: &[u8], min_bytes: u64) -> Result<()> {
    if (body.len() as u64) <= min_bytes {
        return Err(HarvestError::Validation(format!(
            "{} bytes, need more than {min_bytes}",
            body.len()
        )));
    }
    let window = &body[..body.len().min(MAGIC_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(HarvestError::Validation("no %PDF header".into()));
    }
    Ok(())
}

pub fn is_valid_pdf(body: &[u8], min_bytes: u64) -> bool {
    validate_pdf(body, min_bytes).is_ok()
}

/// GETs candidate URLs and keeps only bodies that pass validation.
#[derive(Clone)]
pub struct Downloader {
    http: HarvestClient,
    min_valid_bytes: u64,
}

impl Downloader {
    pub fn new(http: HarvestClient, min_valid_bytes: u64) -> Self {
        Self { http, min_valid_bytes }
    }

    pub fn http(&self) -> &HarvestClient {
        &self.http
    }

    /// `Ok(None)` for a non-success status or an invalid body.
    pub async fn fetch_pdf(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Vec<u8>>> {
        let fetched = self
            .http
            .fetch(service, url, query, self.http.download_timeout())
            .await?;
        if !fetched.is_success() {
            debug!(url, status = fetched.status, "non-success status");
            return Ok(None);
        }
        if let Err(e) = validate_pdf(&fetched.body, self.min_valid_bytes) {
            debug!(
                url,
                content_type = fetched.content_type.as_deref().unwrap_or("-"),
                error = %e,
                "body rejected"
            );
            return Ok(None);
        }
        Ok(Some(fetched.body))
    }
}

/// One source of full text.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Name recorded as the download source.
    fn name(&self) -> &'static str;

    /// Validated PDF bytes, or `None` when this source has nothing for the record.
    /// May fill in missing identifiers on the record.
    async fn attempt(&self, record: &mut PaperRecord, downloader: &Downloader) -> Result<Option<Vec<u8>>>;
}

pub struct RetrievalEngine {
    downloader: Downloader,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    min_valid_bytes: u64,
}

impl RetrievalEngine {
    pub fn new(downloader: Downloader, min_valid_bytes: u64) -> Self {
        Self {
            downloader,
            strategies: Vec::new(),
            min_valid_bytes,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// PMC direct, PMC after PMID translation, Europe PMC, Unpaywall.
    pub fn standard(config: &HarvestConfig, http: HarvestClient, idconv: IdConverter) -> Self {
        let endpoints = &config.endpoints;
        let min = config.harvest.min_valid_bytes;
        Self::new(Downloader::new(http, min), min)
            .with_strategy(Arc::new(pmc::PmcDirect::new(&endpoints.pmc_articles_base)))
            .with_strategy(Arc::new(pmc::PmcTranslated::new(&endpoints.pmc_articles_base, idconv)))
            .with_strategy(Arc::new(europepmc::EuropePmcMirror::new(&endpoints.europepmc_articles_base)))
            .with_strategy(Arc::new(unpaywall::UnpaywallResolver::new(
                &endpoints.unpaywall_base,
                &config.harvest.contact_email,
            )))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Bring `record` to `success`, `exists` or `failed`. True on a usable document.
    #[instrument(skip(self, record, target_dir), fields(pmid = %record.pmid))]
    pub async fn fetch(&self, record: &mut PaperRecord, target_dir: &Path) -> bool {
        let filename = document_filename(record);
        let path = target_dir.join(&filename);

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() > self.min_valid_bytes {
                debug!(file = %filename, "already on disk");
                record.mark_exists(filename, path, meta.len());
                return true;
            }
        }

        for strategy in &self.strategies {
            match strategy.attempt(record, &self.downloader).await {
                Ok(Some(bytes)) => {
                    let size = bytes.len() as u64;
                    return match write_atomic(&path, &bytes) {
                        Ok(()) => {
                            info!(source = strategy.name(), bytes = size, "downloaded");
                            record.mark_success(strategy.name(), filename, path, size);
                            true
                        }
                        Err(e) => {
                            warn!(error = %e, "could not store document");
                            record.download_status = DownloadStatus::Failed;
                            false
                        }
                    };
                }
                Ok(None) => debug!(source = strategy.name(), "no document"),
                Err(e) => debug!(source = strategy.name(), error = %e, "strategy failed"),
            }
        }

        record.download_status = DownloadStatus::Failed;
        false
    }
}
