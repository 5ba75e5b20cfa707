//! On-disk state: per-category tables, document scan, and the global summary.
//!
//! Layout under the base directory:
//!
//! ```text
//! {base}/{key}/{key}_papers.csv
//! {base}/{key}/PMID{id}_{year}_{title}.pdf
//! {base}/all_papers_classification.csv
//! {base}/all_papers_data.json
//! {base}/download_summary_report.txt
//! ```

pub mod report;
pub mod table;

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use pubharvest_common::{DiseaseCategory, HarvestError, Result};

use crate::models::{CategoryStats, PaperRecord};
use crate::persist::write_atomic;
use crate::retrieval::pmid_from_filename;

pub use report::{render_report, ReportHeader};
pub use table::{read_table, table_path, write_table, CATEGORY_COLUMNS, GLOBAL_COLUMNS};

pub const GLOBAL_TABLE: &str = "all_papers_classification.csv";
pub const GLOBAL_JSON: &str = "all_papers_data.json";
pub const REPORT_FILE: &str = "download_summary_report.txt";

/// A valid document found in a category directory.
#[derive(Debug, Clone, PartialEq)]
pub struct OnDiskDocument {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// What a previous run left behind for one category.
#[derive(Debug, Default)]
pub struct LoadedCategory {
    /// Table rows, stored classification intact, status `exists`.
    pub records: Vec<PaperRecord>,
    /// PubMed id → document, for documents above the size floor.
    pub on_disk: BTreeMap<String, OnDiskDocument>,
}

/// Extra settings used only by the global summary.
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub contact_email: String,
    pub default_target: usize,
    pub top_n: usize,
}

pub struct StateStore {
    base_dir: PathBuf,
    min_valid_bytes: u64,
}

impl StateStore {
    pub fn new(base_dir: impl Into<PathBuf>, min_valid_bytes: u64) -> Self {
        Self {
            base_dir: base_dir.into(),
            min_valid_bytes,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn category_dir(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Create the base directory. Failure is fatal to a run.
    pub fn ensure_base_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            HarvestError::Config(format!(
                "cannot create base directory {}: {e}",
                self.base_dir.display()
            ))
        })
    }

    pub fn ensure_category_dir(&self, key: &str) -> Result<PathBuf> {
        let dir = self.category_dir(key);
        std::fs::create_dir_all(&dir).map_err(|e| HarvestError::persistence(&dir, e))?;
        Ok(dir)
    }

    /// Never fails: a missing or unreadable table loads as empty.
    pub fn load_category(&self, category: &DiseaseCategory) -> LoadedCategory {
        let dir = self.category_dir(&category.key);
        let path = table_path(&dir, &category.key);

        let records = if path.is_file() {
            match read_table(&path, &category.key, category.label()) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable category table");
                    Vec::new()
                }
            }
        } else {
            debug!(path = %path.display(), "no category table yet");
            Vec::new()
        };

        let on_disk = self.scan_documents(&dir);
        debug!(
            category = %category.key,
            rows = records.len(),
            documents = on_disk.len(),
            "loaded category state"
        );
        LoadedCategory { records, on_disk }
    }

    /// `*.pdf` files above the size floor whose name carries a PubMed id.
    /// The first name in sorted order wins when two files share an id.
    pub fn scan_documents(&self, dir: &Path) -> BTreeMap<String, OnDiskDocument> {
        let mut found = BTreeMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return found,
        };

        let mut names: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                name.to_ascii_lowercase().ends_with(".pdf").then(|| (name, e.path()))
            })
            .collect();
        names.sort();

        for (filename, path) in names {
            let Ok(meta) = std::fs::metadata(&path) else { continue };
            if !meta.is_file() || meta.len() <= self.min_valid_bytes {
                continue;
            }
            let Some(pmid) = pmid_from_filename(&filename) else { continue };
            found.entry(pmid).or_insert(OnDiskDocument {
                filename,
                path,
                size: meta.len(),
            });
        }
        found
    }

    pub fn save_category(&self, category: &DiseaseCategory, records: &[PaperRecord]) -> Result<PathBuf> {
        let dir = self.ensure_category_dir(&category.key)?;
        let path = table_path(&dir, &category.key);
        write_table(&path, &CATEGORY_COLUMNS, records)?;
        info!(path = %path.display(), rows = records.len(), "category table saved");
        Ok(path)
    }

    /// Global table, JSON snapshot and text report.
    pub fn save_global_summary(
        &self,
        records: &[PaperRecord],
        stats: &[CategoryStats],
        options: &SummaryOptions,
    ) -> Result<()> {
        self.ensure_base_dir()?;

        let mut sorted: Vec<&PaperRecord> = records.iter().collect();
        sorted.sort_by(|a, b| {
            a.category_key
                .cmp(&b.category_key)
                .then(b.quality_score.total_cmp(&a.quality_score))
        });
        write_table(&self.base_dir.join(GLOBAL_TABLE), &GLOBAL_COLUMNS, sorted)?;

        let json = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.base_dir.join(GLOBAL_JSON), &json)?;

        let header = ReportHeader {
            generated_at: Utc::now(),
            contact_email: &options.contact_email,
            base_dir: &self.base_dir,
            default_target: options.default_target,
            top_n: options.top_n,
        };
        let report = render_report(&header, records, stats);
        write_atomic(&self.base_dir.join(REPORT_FILE), report.as_bytes())?;

        info!(base = %self.base_dir.display(), papers = records.len(), "global summary saved");
        Ok(())
    }
}
