//! Data models for the harvesting pipeline.

use chrono::{DateTime, Utc};
use pubharvest_grading::{Classification, EvidenceLevel, Grade, StudyType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    #[default]
    Pending,
    Success,
    /// Valid content was already on disk before the fetch.
    Exists,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Success => "success",
            DownloadStatus::Exists => "exists",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DownloadStatus::Success | DownloadStatus::Exists)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(DownloadStatus::Pending),
            "success" => Ok(DownloadStatus::Success),
            "exists" => Ok(DownloadStatus::Exists),
            "failed" => Ok(DownloadStatus::Failed),
            other => Err(format!("unknown download status '{other}'")),
        }
    }
}

/// One citation with its grading and download outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub pmid: String,
    pub pmc_id: Option<String>,
    pub doi: Option<String>,

    pub title: String,
    /// `"Last Initials"` names, at most six, then `" et al."`.
    pub authors: String,
    pub journal: String,
    pub year: String,
    pub month: String,

    pub category_key: String,
    pub category_label: String,

    pub abstract_text: String,
    pub keywords: String,
    pub publication_types: String,

    pub study_type: StudyType,
    pub evidence_level: EvidenceLevel,
    pub grade: Grade,
    pub quality_score: f64,
    pub impact_factor: f64,
    pub sample_size: u64,
    pub is_free_fulltext: bool,

    pub download_status: DownloadStatus,
    pub download_source: Option<String>,
    pub filename: Option<String>,
    /// Bytes.
    pub file_size: u64,
    pub local_path: Option<PathBuf>,
}

impl PaperRecord {
    pub fn new(pmid: impl Into<String>) -> Self {
        Self {
            pmid: pmid.into(),
            pmc_id: None,
            doi: None,
            title: String::new(),
            authors: String::new(),
            journal: String::new(),
            year: String::new(),
            month: String::new(),
            category_key: String::new(),
            category_label: String::new(),
            abstract_text: String::new(),
            keywords: String::new(),
            publication_types: String::new(),
            study_type: StudyType::Other,
            evidence_level: EvidenceLevel::L5,
            grade: Grade::D,
            quality_score: 0.0,
            impact_factor: 0.0,
            sample_size: 0,
            is_free_fulltext: false,
            download_status: DownloadStatus::Pending,
            download_source: None,
            filename: None,
            file_size: 0,
            local_path: None,
        }
    }

    pub fn in_category(mut self, key: &str, label: &str) -> Self {
        self.category_key = key.to_string();
        self.category_label = label.to_string();
        self
    }

    pub fn apply_classification(&mut self, c: &Classification) {
        self.study_type = c.study_type;
        self.evidence_level = c.evidence_level;
        self.grade = c.grade;
        self.quality_score = c.quality_score;
        self.impact_factor = c.impact_factor;
        self.sample_size = c.sample_size;
    }

    pub fn mark_exists(&mut self, filename: String, path: PathBuf, size: u64) {
        self.download_status = DownloadStatus::Exists;
        self.filename = Some(filename);
        self.local_path = Some(path);
        self.file_size = size;
    }

    pub fn mark_success(&mut self, source: &str, filename: String, path: PathBuf, size: u64) {
        self.download_status = DownloadStatus::Success;
        self.download_source = Some(source.to_string());
        self.filename = Some(filename);
        self.local_path = Some(path);
        self.file_size = size;
    }

    pub fn is_meta_analysis(&self) -> bool { self.study_type == StudyType::MetaAnalysis }
    pub fn is_systematic_review(&self) -> bool { self.study_type == StudyType::SystematicReview }
    pub fn is_rct(&self) -> bool { self.study_type == StudyType::Rct }
    pub fn is_cohort(&self) -> bool { self.study_type == StudyType::Cohort }
    pub fn is_case_control(&self) -> bool { self.study_type == StudyType::CaseControl }
    pub fn is_guideline(&self) -> bool { self.study_type == StudyType::Guideline }
    pub fn is_review(&self) -> bool { self.study_type == StudyType::Review }
}

/// Per-category outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub key: String,
    pub label: String,
    pub target: usize,
    pub existing_valid: usize,
    pub new_downloaded: usize,
    pub failed: usize,
    pub total: usize,
    /// Documents on disk with no recorded metadata.
    pub untracked: usize,
    /// Download source name → documents fetched from it.
    pub by_source: BTreeMap<String, usize>,
    /// Candidates ran out before the target was met.
    pub closed_short: bool,
    /// Interrupted before the target was met.
    #[serde(default)]
    pub cancelled: bool,
    pub error: Option<String>,
}

impl CategoryStats {
    pub fn new(key: &str, label: &str, target: usize) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            target,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<PaperRecord>,
    pub stats: Vec<CategoryStats>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_existing(&self) -> usize {
        self.stats.iter().map(|s| s.existing_valid).sum()
    }

    pub fn total_new(&self) -> usize {
        self.stats.iter().map(|s| s.new_downloaded).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.stats.iter().map(|s| s.failed).sum()
    }
}
