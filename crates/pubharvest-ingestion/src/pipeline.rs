//! Category pipeline and run orchestration.
//!
//! For each category, in declared order:
//!   1. Reconcile the stored table with documents on disk
//!   2. Search the citation index for the shortfall plus a margin
//!   3. Fetch metadata in batches
//!   4. Classify and rank by quality score
//!   5. Download in rank order until the target is met or candidates run out
//!   6. Persist the category table
//!
//! One [`Registry`] spans the whole run, so no paper lands in two
//! categories. Failures stay inside the stage or category that hit them.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use pubharvest_common::{
    DiseaseCategory, HarvestClient, HarvestConfig, HarvestError, HarvestSettings, Result,
};
use pubharvest_grading::{ClassifierInput, EvidenceClassifier, ImpactTable};

use crate::dedup::Registry;
use crate::models::{CategoryStats, DownloadStatus, PaperRecord, RunSummary};
use crate::reconcile::reconcile;
use crate::retrieval::RetrievalEngine;
use crate::sources::idconv::IdConverter;
use crate::sources::pubmed::PubMedClient;
use crate::sources::CitationIndex;
use crate::store::{StateStore, SummaryOptions};

// ── Search sizing ─────────────────────────────────────────────────────────────

const TERM_RETMAX_CAP: usize = 80;
const TERM_RETMAX_HEADROOM: usize = 50;
const SUPPLEMENT_RETMAX_CAP: usize = 60;
const SUPPLEMENT_RETMAX_HEADROOM: usize = 30;

/// Per-term result count for the free-full-text search.
pub fn term_retmax(want: usize, have: usize) -> usize {
    (want.saturating_sub(have) + TERM_RETMAX_HEADROOM).min(TERM_RETMAX_CAP)
}

/// Per-term result count for the open-access supplement.
pub fn supplement_retmax(need: usize) -> usize {
    (need + SUPPLEMENT_RETMAX_HEADROOM).min(SUPPLEMENT_RETMAX_CAP)
}

// ── States ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Reconciling,
    Searching,
    FetchingMetadata,
    Classifying,
    Downloading,
    Persisted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Reconciling => "reconciling",
            PipelineState::Searching => "searching",
            PipelineState::FetchingMetadata => "fetching_metadata",
            PipelineState::Classifying => "classifying",
            PipelineState::Downloading => "downloading",
            PipelineState::Persisted => "persisted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted records and counters for one category.
#[derive(Debug, Clone)]
pub struct CategoryOutcome {
    pub records: Vec<PaperRecord>,
    pub stats: CategoryStats,
}

// ── Category pipeline ─────────────────────────────────────────────────────────

pub struct CategoryPipeline<'a> {
    harvester: &'a Harvester,
    category: &'a DiseaseCategory,
    registry: &'a Registry,
    cancel: &'a CancellationToken,
    target: usize,
    state: PipelineState,
    stats: CategoryStats,
    /// Records counted toward the target, in acceptance order.
    accepted: Vec<PaperRecord>,
    /// Ids this category already owns, accepted or untracked.
    held: HashSet<String>,
}

impl<'a> CategoryPipeline<'a> {
    pub fn new(
        harvester: &'a Harvester,
        category: &'a DiseaseCategory,
        registry: &'a Registry,
        cancel: &'a CancellationToken,
    ) -> Self {
        let target = category.target_or(harvester.settings().papers_per_category);
        Self {
            harvester,
            category,
            registry,
            cancel,
            target,
            state: PipelineState::Reconciling,
            stats: CategoryStats::new(&category.key, category.label(), target),
            accepted: Vec::new(),
            held: HashSet::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(category = %self.category.key, from = %self.state, to = %state, "pipeline state");
        self.state = state;
    }

    /// Never fails: a category-level error is recorded in the stats.
    #[instrument(skip(self), fields(category = %self.category.key, target = self.target))]
    pub async fn run(mut self) -> CategoryOutcome {
        if let Err(e) = self.execute().await {
            warn!(error = %e, "category aborted");
            self.stats.error = Some(e.to_string());
        }
        self.stats.total = self.accepted.len();
        info!(
            existing = self.stats.existing_valid,
            new = self.stats.new_downloaded,
            failed = self.stats.failed,
            total = self.stats.total,
            "category finished"
        );
        CategoryOutcome {
            records: self.accepted,
            stats: self.stats,
        }
    }

    async fn execute(&mut self) -> Result<()> {
        self.reconcile_existing();

        let shortfall = self.target.saturating_sub(self.accepted.len());
        if shortfall == 0 {
            info!(existing = self.accepted.len(), "target already met");
            self.accepted.truncate(self.target);
            return self.persist();
        }

        self.enter(PipelineState::Searching);
        let want = shortfall + self.harvester.settings().overshoot_margin;
        let candidates = self.search(want).await;
        info!(candidates = candidates.len(), shortfall, "search finished");

        self.enter(PipelineState::FetchingMetadata);
        let mut records = self.fetch_metadata(&candidates).await;

        self.enter(PipelineState::Classifying);
        self.classify(&mut records);

        self.enter(PipelineState::Downloading);
        let dir = self.harvester.store.ensure_category_dir(&self.category.key)?;
        self.download(records, &dir).await;

        self.persist()
    }

    // ── Reconciling ──────────────────────────────────────────────────────────

    fn reconcile_existing(&mut self) {
        let loaded = self.harvester.store.load_category(self.category);
        let reconciled = reconcile(loaded.records, &loaded.on_disk);
        if reconciled.stale > 0 {
            debug!(stale = reconciled.stale, "table rows without a document");
        }

        for record in reconciled.records {
            match self.registry.try_claim(&record.pmid) {
                Some(claim) => {
                    claim.commit();
                    self.held.insert(record.pmid.clone());
                    self.accepted.push(record);
                }
                None => warn!(pmid = %record.pmid, "already counted by an earlier category, dropped"),
            }
        }

        for pmid in reconciled.untracked {
            match self.registry.try_claim(&pmid) {
                Some(claim) => {
                    claim.commit();
                    self.held.insert(pmid);
                    self.stats.untracked += 1;
                }
                None => warn!(%pmid, "untracked document already counted by an earlier category"),
            }
        }
        if self.stats.untracked > 0 {
            warn!(untracked = self.stats.untracked, "documents on disk without metadata");
        }

        self.stats.existing_valid = self.accepted.len();
        info!(existing = self.accepted.len(), "reconciled");
    }

    fn is_known(&self, pmid: &str) -> bool {
        self.held.contains(pmid) || self.registry.contains(pmid)
    }

    // ── Searching ────────────────────────────────────────────────────────────

    /// Up to `want` unseen ids, free-full-text hits first.
    async fn search(&self, want: usize) -> Vec<String> {
        let index = self.harvester.index.as_ref();
        let width = self.harvester.settings().search_concurrency.max(1);
        let terms: Vec<&str> = self
            .category
            .search_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut found: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for window in terms.chunks(width) {
            if found.len() >= want || self.cancel.is_cancelled() {
                break;
            }
            let retmax = term_retmax(want, found.len());
            let results: Vec<(&str, Result<Vec<String>>)> = stream::iter(window.iter().copied())
                .map(|term| async move { (term, index.search_free_fulltext(term, retmax).await) })
                .buffered(width)
                .collect()
                .await;

            for (term, result) in results {
                match result {
                    Ok(ids) => self.absorb(&mut found, &mut seen, ids, want),
                    Err(e) => warn!(term, error = %e, "free full text search failed"),
                }
            }
        }

        if found.len() < want && !self.cancel.is_cancelled() {
            debug!(have = found.len(), want, "supplementing from open-access subset");
            for term in &terms {
                if found.len() >= want || self.cancel.is_cancelled() {
                    break;
                }
                let retmax = supplement_retmax(want - found.len());
                let pmcids = match index.search_open_access(term, retmax).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(term, error = %e, "open access search failed");
                        continue;
                    }
                };
                if pmcids.is_empty() {
                    continue;
                }
                match index.pmcids_to_pmids(&pmcids).await {
                    Ok(pmids) => self.absorb(&mut found, &mut seen, pmids, want),
                    Err(e) => warn!(term, error = %e, "PMCID translation failed"),
                }
            }
        }

        found
    }

    /// Append unseen ids in order, stopping at `want`.
    fn absorb(&self, found: &mut Vec<String>, seen: &mut HashSet<String>, ids: Vec<String>, want: usize) {
        for id in ids {
            if found.len() >= want {
                break;
            }
            let id = id.trim().to_string();
            if id.is_empty() || self.is_known(&id) || !seen.insert(id.clone()) {
                continue;
            }
            found.push(id);
        }
    }

    // ── Fetching metadata ────────────────────────────────────────────────────

    async fn fetch_metadata(&self, pmids: &[String]) -> Vec<PaperRecord> {
        let batch_size = self.harvester.settings().detail_batch_size.max(1);
        let mut records = Vec::with_capacity(pmids.len());
        let mut seen = HashSet::new();

        for (i, batch) in pmids.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.harvester.index.fetch_records(batch).await {
                Ok(batch_records) => {
                    for record in batch_records {
                        if seen.insert(record.pmid.clone()) {
                            records.push(record.in_category(&self.category.key, self.category.label()));
                        }
                    }
                }
                Err(e) => warn!(batch = i, size = batch.len(), error = %e, "metadata batch skipped"),
            }
        }
        info!(fetched = records.len(), requested = pmids.len(), "metadata fetched");
        records
    }

    // ── Classifying ──────────────────────────────────────────────────────────

    fn classify(&self, records: &mut [PaperRecord]) {
        let classifier = &self.harvester.classifier;
        for record in records.iter_mut() {
            let input = ClassifierInput {
                title: &record.title,
                abstract_text: &record.abstract_text,
                publication_types: &record.publication_types,
                journal: &record.journal,
                year: &record.year,
                has_pmc_id: record.pmc_id.is_some(),
                is_free_fulltext: record.is_free_fulltext,
            };
            let classification = classifier.classify(&input);
            record.apply_classification(&classification);
        }
        // Stable: equal scores keep search order.
        records.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    }

    // ── Downloading ──────────────────────────────────────────────────────────

    async fn download(&mut self, ranked: Vec<PaperRecord>, dir: &Path) {
        let engine = self.harvester.engine.as_ref();
        let width = self.harvester.settings().download_concurrency.max(1);
        let mut queue = ranked.into_iter();

        loop {
            if self.accepted.len() >= self.target {
                break;
            }
            if self.cancel.is_cancelled() {
                info!("cancelled, no new downloads");
                break;
            }

            let room = (self.target - self.accepted.len()).min(width);
            let mut batch = Vec::with_capacity(room);
            while batch.len() < room {
                let Some(record) = queue.next() else { break };
                if self.held.contains(&record.pmid) {
                    continue;
                }
                match self.registry.try_claim(&record.pmid) {
                    Some(claim) => batch.push((record, claim)),
                    None => debug!(pmid = %record.pmid, "claimed elsewhere, skipped"),
                }
            }
            if batch.is_empty() {
                break;
            }

            let outcomes = futures::future::join_all(batch.into_iter().map(|(mut record, claim)| async move {
                let ok = engine.fetch(&mut record, dir).await;
                (record, claim, ok)
            }))
            .await;

            for (record, claim, ok) in outcomes {
                if !ok {
                    info!(pmid = %record.pmid, "download failed");
                    self.stats.failed += 1;
                    continue;
                }
                claim.commit();
                self.held.insert(record.pmid.clone());
                if record.download_status == DownloadStatus::Exists {
                    self.stats.existing_valid += 1;
                } else {
                    self.stats.new_downloaded += 1;
                    if let Some(source) = &record.download_source {
                        *self.stats.by_source.entry(source.clone()).or_default() += 1;
                    }
                }
                info!(
                    pmid = %record.pmid,
                    progress = %format!("{}/{}", self.accepted.len() + 1, self.target),
                    status = %record.download_status,
                    source = record.download_source.as_deref().unwrap_or("-"),
                    "accepted"
                );
                self.accepted.push(record);
            }
        }
    }

    // ── Persisted ────────────────────────────────────────────────────────────

    fn persist(&mut self) -> Result<()> {
        self.enter(PipelineState::Persisted);
        self.harvester.store.save_category(self.category, &self.accepted)?;
        if self.accepted.len() < self.target && self.cancel.is_cancelled() {
            warn!(
                collected = self.accepted.len(),
                target = self.target,
                "cancelled before target"
            );
            self.stats.cancelled = true;
        } else if self.accepted.len() < self.target {
            let shortage = HarvestError::Exhaustion {
                category: self.category.key.clone(),
                collected: self.accepted.len(),
                target: self.target,
            };
            warn!("{shortage}");
            self.stats.closed_short = true;
        }
        Ok(())
    }
}

// ── Harvester ─────────────────────────────────────────────────────────────────

/// Runs every configured category and writes the global summary.
pub struct Harvester {
    config: HarvestConfig,
    index: Arc<dyn CitationIndex>,
    engine: Arc<RetrievalEngine>,
    store: StateStore,
    classifier: EvidenceClassifier,
}

impl Harvester {
    /// Wire the PubMed index and the standard retrieval chain from `config`.
    pub fn new(config: HarvestConfig) -> Result<Self> {
        let http = HarvestClient::new(&config.harvest, &config.rate_limits)?;
        let idconv = IdConverter::new(
            http.clone(),
            &config.endpoints.idconv_url,
            &config.harvest.tool_name,
            &config.harvest.contact_email,
        );
        let index = PubMedClient::new(
            http.clone(),
            &config.endpoints.eutils_base,
            &config.harvest,
            idconv.clone(),
        );
        let engine = RetrievalEngine::standard(&config, http, idconv);
        Ok(Self::with_components(config, Arc::new(index), engine))
    }

    pub fn with_components(
        config: HarvestConfig,
        index: Arc<dyn CitationIndex>,
        engine: RetrievalEngine,
    ) -> Self {
        let impact = ImpactTable::builtin().with_overrides(&config.grading.impact_factors);
        let store = StateStore::new(&config.harvest.base_dir, config.harvest.min_valid_bytes);
        Self {
            index,
            engine: Arc::new(engine),
            store,
            classifier: EvidenceClassifier::new(impact),
            config,
        }
    }

    /// Pin the recency reference year.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.classifier = self.classifier.with_reference_year(year);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.config.harvest
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process all categories in order. Only configuration problems are errors;
    /// everything else is logged and reflected in the summary.
    #[instrument(skip(self, cancel), fields(categories = self.config.categories.len()))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        self.config.validate()?;
        self.store.ensure_base_dir()?;

        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        let t0 = Instant::now();
        let registry = Registry::new();
        info!(%run_id, base = %self.store.base_dir().display(), "harvest started");

        let mut records = Vec::new();
        let mut stats = Vec::new();
        for (i, category) in self.config.categories.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = self.config.categories.len() - i, "cancelled, skipping remaining categories");
                break;
            }
            info!(
                step = %format!("{}/{}", i + 1, self.config.categories.len()),
                category = %category.key,
                "processing category"
            );
            let outcome = CategoryPipeline::new(self, category, &registry, &cancel).run().await;
            records.extend(outcome.records);
            stats.push(outcome.stats);
        }

        let options = SummaryOptions {
            contact_email: self.config.harvest.contact_email.clone(),
            default_target: self.config.harvest.papers_per_category,
            top_n: self.config.harvest.report_top_n,
        };
        if let Err(e) = self.store.save_global_summary(&records, &stats, &options) {
            warn!(error = %e, "global summary not written");
        }

        let summary = RunSummary {
            run_id,
            started_at,
            records,
            stats,
            duration_ms: t0.elapsed().as_millis() as u64,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            %run_id,
            papers = summary.records.len(),
            existing = summary.total_existing(),
            new = summary.total_new(),
            failed = summary.total_failed(),
            duration_ms = summary.duration_ms,
            cancelled = summary.cancelled,
            "harvest finished"
        );
        Ok(summary)
    }
}
