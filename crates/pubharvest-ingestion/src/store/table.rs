//! Tabular (CSV) form of [`PaperRecord`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use pubharvest_common::{HarvestError, Result};
use pubharvest_grading::{Grade, StudyType};

use crate::models::{DownloadStatus, PaperRecord};
use crate::persist::write_atomic;

const MAX_PUBLICATION_TYPE_CHARS: usize = 100;

/// Column order of a per-category table.
pub const CATEGORY_COLUMNS: [&str; 31] = [
    "index",
    "pmid",
    "pmc_id",
    "doi",
    "title",
    "authors",
    "journal",
    "year",
    "month",
    "category_label",
    "category_key",
    "publication_type",
    "study_type",
    "is_meta_analysis",
    "is_systematic_review",
    "is_rct",
    "is_cohort",
    "is_case_control",
    "is_guideline",
    "is_review",
    "sample_size",
    "impact_factor",
    "evidence_level",
    "grade",
    "quality_score",
    "download_status",
    "filename",
    "download_source",
    "file_size_kb",
    "keywords",
    "abstract",
];

/// Column order of the global table: category first.
pub const GLOBAL_COLUMNS: [&str; 31] = [
    "index",
    "category_label",
    "category_key",
    "pmid",
    "pmc_id",
    "doi",
    "title",
    "authors",
    "journal",
    "year",
    "month",
    "publication_type",
    "study_type",
    "is_meta_analysis",
    "is_systematic_review",
    "is_rct",
    "is_cohort",
    "is_case_control",
    "is_guideline",
    "is_review",
    "sample_size",
    "impact_factor",
    "evidence_level",
    "grade",
    "quality_score",
    "download_status",
    "filename",
    "download_source",
    "file_size_kb",
    "keywords",
    "abstract",
];

fn yes_no(flag: bool) -> String {
    if flag { "Y" } else { "N" }.to_string()
}

fn cell(index: usize, r: &PaperRecord, column: &str) -> String {
    match column {
        "index" => index.to_string(),
        "pmid" => r.pmid.clone(),
        "pmc_id" => r.pmc_id.clone().unwrap_or_default(),
        "doi" => r.doi.clone().unwrap_or_default(),
        "title" => r.title.clone(),
        "authors" => r.authors.clone(),
        "journal" => r.journal.clone(),
        "year" => r.year.clone(),
        "month" => r.month.clone(),
        "category_label" => r.category_label.clone(),
        "category_key" => r.category_key.clone(),
        "publication_type" => r
            .publication_types
            .chars()
            .take(MAX_PUBLICATION_TYPE_CHARS)
            .collect(),
        "study_type" => r.study_type.to_string(),
        "is_meta_analysis" => yes_no(r.is_meta_analysis()),
        "is_systematic_review" => yes_no(r.is_systematic_review()),
        "is_rct" => yes_no(r.is_rct()),
        "is_cohort" => yes_no(r.is_cohort()),
        "is_case_control" => yes_no(r.is_case_control()),
        "is_guideline" => yes_no(r.is_guideline()),
        "is_review" => yes_no(r.is_review()),
        "sample_size" if r.sample_size > 0 => r.sample_size.to_string(),
        "impact_factor" => format!("{:.1}", r.impact_factor),
        "evidence_level" => r.evidence_level.to_string(),
        "grade" => r.grade.to_string(),
        "quality_score" => format!("{:.1}", r.quality_score),
        "download_status" => r.download_status.to_string(),
        "filename" => r.filename.clone().unwrap_or_default(),
        "download_source" => r.download_source.clone().unwrap_or_default(),
        "file_size_kb" if r.file_size > 0 => format!("{:.1}", r.file_size as f64 / 1024.0),
        "keywords" => r.keywords.clone(),
        "abstract" => r.abstract_text.clone(),
        _ => String::new(),
    }
}

/// Serialize `records` under `columns` and write them atomically to `path`.
pub fn write_table<'a, I>(path: &Path, columns: &[&str], records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a PaperRecord>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for (i, record) in records.into_iter().enumerate() {
        writer.write_record(columns.iter().map(|c| cell(i + 1, record, c)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| HarvestError::persistence(path, e.into_error()))?;
    write_atomic(path, &bytes)
}

/// One row as read back from disk. Every column is optional text so that
/// hand-edited or older tables still load.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoredRow {
    pub pmid: String,
    pub pmc_id: String,
    pub doi: String,
    pub title: String,
    pub authors: String,
    pub journal: String,
    pub year: String,
    pub month: String,
    pub category_label: String,
    pub category_key: String,
    pub publication_type: String,
    pub study_type: String,
    pub sample_size: String,
    pub impact_factor: String,
    pub evidence_level: String,
    pub grade: String,
    pub quality_score: String,
    pub download_status: String,
    pub filename: String,
    pub download_source: String,
    pub file_size_kb: String,
    pub keywords: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl StoredRow {
    /// `None` for rows without a PubMed id. The stored classification is
    /// kept as written; the status becomes `exists`.
    pub fn into_record(self, key: &str, label: &str) -> Option<PaperRecord> {
        let pmid = self.pmid.trim().to_string();
        if pmid.is_empty() {
            return None;
        }

        let mut record = PaperRecord::new(pmid).in_category(key, label);
        record.pmc_id = non_empty(self.pmc_id);
        record.doi = non_empty(self.doi);
        record.title = self.title;
        record.authors = self.authors;
        record.journal = self.journal;
        record.year = self.year.trim().to_string();
        record.month = self.month;
        record.abstract_text = self.abstract_text;
        record.keywords = self.keywords;
        record.publication_types = self.publication_type;

        record.study_type = self.study_type.parse().unwrap_or(StudyType::Other);
        record.evidence_level = self
            .evidence_level
            .parse()
            .unwrap_or_else(|_| record.study_type.evidence_level());
        record.quality_score = self.quality_score.trim().parse().unwrap_or(0.0);
        record.grade = self
            .grade
            .parse()
            .unwrap_or_else(|_| Grade::from_score(record.quality_score));
        record.impact_factor = self.impact_factor.trim().parse().unwrap_or(0.0);
        record.sample_size = self.sample_size.trim().parse().unwrap_or(0);
        record.is_free_fulltext = record.pmc_id.is_some();

        record.download_status = DownloadStatus::Exists;
        record.download_source = non_empty(self.download_source);
        record.filename = non_empty(self.filename);
        record.file_size = self
            .file_size_kb
            .trim()
            .parse::<f64>()
            .map(|kb| (kb * 1024.0).round() as u64)
            .unwrap_or(0);
        Some(record)
    }
}

/// Parse a category table. Rows that cannot be decoded are skipped.
pub fn read_table(path: &Path, key: &str, label: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h.trim() == "pmid") {
        return Err(HarvestError::Parse(format!(
            "{}: no pmid column",
            path.display()
        )));
    }

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<StoredRow>().enumerate() {
        match row {
            Ok(row) => records.extend(row.into_record(key, label)),
            Err(e) => tracing::warn!(path = %path.display(), row = line + 1, error = %e, "skipping unreadable row"),
        }
    }
    Ok(records)
}

/// `{base}/{key}/{key}_papers.csv`
pub fn table_path(category_dir: &Path, key: &str) -> PathBuf {
    category_dir.join(format!("{key}_papers.csv"))
}
