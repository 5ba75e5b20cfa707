//! Evidence classification and quality scoring.
//!
//! score = type (≤35) + venue (≤20) + recency (≤15) + sample (≤15)
//!       + abstract (≤10) + open access (5), clamped to [0, 100]

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::sample_size::extract_sample_size;
use crate::tables::{EvidenceLevel, Grade, ImpactTable, StudyType, BUILTIN_STUDY_TYPES};

/// Fields of a record the classifier reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierInput<'a> {
    pub title: &'a str,
    pub abstract_text: &'a str,
    pub publication_types: &'a str,
    pub journal: &'a str,
    pub year: &'a str,
    pub has_pmc_id: bool,
    pub is_free_fulltext: bool,
}

/// Points contributed by each scoring factor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub study_type: f64,
    pub venue: f64,
    pub recency: f64,
    pub sample_size: f64,
    pub abstract_length: f64,
    pub open_access: f64,
}

impl ScoreComponents {
    pub fn total(&self) -> f64 {
        self.study_type
            + self.venue
            + self.recency
            + self.sample_size
            + self.abstract_length
            + self.open_access
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub study_type: StudyType,
    pub evidence_level: EvidenceLevel,
    pub grade: Grade,
    /// 0–100, one decimal.
    pub quality_score: f64,
    pub impact_factor: f64,
    /// 0 when no plausible count was found.
    pub sample_size: u64,
    pub components: ScoreComponents,
}

#[derive(Debug, Clone)]
pub struct EvidenceClassifier {
    impact: ImpactTable,
    reference_year: i32,
}

impl Default for EvidenceClassifier {
    fn default() -> Self {
        Self::new(ImpactTable::builtin())
    }
}

impl EvidenceClassifier {
    /// Recency is measured against the current UTC year, fixed here.
    pub fn new(impact: ImpactTable) -> Self {
        Self {
            impact,
            reference_year: chrono::Utc::now().year(),
        }
    }

    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn classify(&self, input: &ClassifierInput<'_>) -> Classification {
        let text = format!(
            "{} {} {}",
            input.title, input.abstract_text, input.publication_types
        )
        .to_lowercase();

        let study_type = BUILTIN_STUDY_TYPES.identify(&text);
        let impact_factor = self.impact.lookup(input.journal);
        let sample_size = extract_sample_size(input.abstract_text);

        let components = ScoreComponents {
            study_type: study_type.type_weight(),
            venue: venue_points(impact_factor),
            recency: self.recency_points(input.year),
            sample_size: sample_points(sample_size),
            abstract_length: abstract_points(input.abstract_text),
            open_access: if input.has_pmc_id || input.is_free_fulltext { 5.0 } else { 0.0 },
        };

        let quality_score = round1(components.total().clamp(0.0, 100.0));

        Classification {
            study_type,
            evidence_level: study_type.evidence_level(),
            grade: Grade::from_score(quality_score),
            quality_score,
            impact_factor,
            sample_size,
            components,
        }
    }

    fn recency_points(&self, year: &str) -> f64 {
        let Ok(year) = year.trim().parse::<i32>() else {
            return 3.0;
        };
        match self.reference_year - year {
            age if age <= 1 => 15.0,
            2 => 13.0,
            3 => 11.0,
            4..=5 => 9.0,
            6..=10 => 6.0,
            _ => 3.0,
        }
    }
}

fn venue_points(impact_factor: f64) -> f64 {
    match impact_factor {
        f if f >= 50.0 => 20.0,
        f if f >= 30.0 => 18.0,
        f if f >= 20.0 => 16.0,
        f if f >= 10.0 => 13.0,
        f if f >= 5.0 => 10.0,
        f if f >= 3.0 => 7.0,
        _ => 4.0,
    }
}

fn sample_points(n: u64) -> f64 {
    match n {
        0 => 2.0,
        n if n >= 50_000 => 15.0,
        n if n >= 10_000 => 13.0,
        n if n >= 1_000 => 11.0,
        n if n >= 500 => 9.0,
        n if n >= 100 => 6.0,
        _ => 3.0,
    }
}

fn abstract_points(abstract_text: &str) -> f64 {
    match abstract_text.chars().count() {
        0 => 0.0,
        n if n >= 2000 => 10.0,
        n if n >= 1500 => 8.0,
        n if n >= 1000 => 6.0,
        n if n >= 500 => 4.0,
        _ => 2.0,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
