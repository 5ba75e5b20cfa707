//! Lookup tables driving the evidence classifier.
//!
//! Study types are matched against a priority-ordered pattern list; the
//! first type with any matching pattern wins. Venue impact factors live in
//! an [`ImpactTable`] that configuration can extend or correct.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Study type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    MetaAnalysis,
    SystematicReview,
    Guideline,
    Rct,
    Cohort,
    CaseControl,
    CrossSectional,
    CaseReport,
    Review,
    Other,
}

impl StudyType {
    pub const ALL: [StudyType; 10] = [
        StudyType::MetaAnalysis,
        StudyType::SystematicReview,
        StudyType::Guideline,
        StudyType::Rct,
        StudyType::Cohort,
        StudyType::CaseControl,
        StudyType::CrossSectional,
        StudyType::CaseReport,
        StudyType::Review,
        StudyType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::MetaAnalysis => "meta_analysis",
            StudyType::SystematicReview => "systematic_review",
            StudyType::Guideline => "guideline",
            StudyType::Rct => "rct",
            StudyType::Cohort => "cohort",
            StudyType::CaseControl => "case_control",
            StudyType::CrossSectional => "cross_sectional",
            StudyType::CaseReport => "case_report",
            StudyType::Review => "review",
            StudyType::Other => "other",
        }
    }

    /// Points contributed to the quality score (max 35).
    pub fn type_weight(&self) -> f64 {
        match self {
            StudyType::MetaAnalysis => 35.0,
            StudyType::SystematicReview => 33.0,
            StudyType::Guideline => 32.0,
            StudyType::Rct => 28.0,
            StudyType::Cohort => 22.0,
            StudyType::CaseControl => 18.0,
            StudyType::CrossSectional => 15.0,
            StudyType::Review => 12.0,
            StudyType::CaseReport => 8.0,
            StudyType::Other => 6.0,
        }
    }

    pub fn evidence_level(&self) -> EvidenceLevel {
        match self {
            StudyType::MetaAnalysis | StudyType::SystematicReview | StudyType::Guideline => {
                EvidenceLevel::L1a
            }
            StudyType::Rct => EvidenceLevel::L1b,
            StudyType::Cohort => EvidenceLevel::L2b,
            StudyType::CaseControl => EvidenceLevel::L3b,
            StudyType::CrossSectional | StudyType::CaseReport => EvidenceLevel::L4,
            StudyType::Review | StudyType::Other => EvidenceLevel::L5,
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown study type '{s}'"))
    }
}

// ── Evidence level and grade ─────────────────────────────────────────────────

/// Oxford-style evidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceLevel {
    #[serde(rename = "1a")]
    L1a,
    #[serde(rename = "1b")]
    L1b,
    #[serde(rename = "2b")]
    L2b,
    #[serde(rename = "3b")]
    L3b,
    #[serde(rename = "4")]
    L4,
    #[serde(rename = "5")]
    L5,
}

impl EvidenceLevel {
    pub const ALL: [EvidenceLevel; 6] = [
        EvidenceLevel::L1a,
        EvidenceLevel::L1b,
        EvidenceLevel::L2b,
        EvidenceLevel::L3b,
        EvidenceLevel::L4,
        EvidenceLevel::L5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceLevel::L1a => "1a",
            EvidenceLevel::L1b => "1b",
            EvidenceLevel::L2b => "2b",
            EvidenceLevel::L3b => "3b",
            EvidenceLevel::L4 => "4",
            EvidenceLevel::L5 => "5",
        }
    }

    /// Short description used in reports.
    pub fn description(&self) -> &'static str {
        match self {
            EvidenceLevel::L1a => "Systematic review / meta-analysis / guideline",
            EvidenceLevel::L1b => "Randomized controlled trial",
            EvidenceLevel::L2b => "Cohort study",
            EvidenceLevel::L3b => "Case-control study",
            EvidenceLevel::L4 => "Cross-sectional / case report",
            EvidenceLevel::L5 => "Review / expert opinion",
        }
    }
}

impl fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvidenceLevel::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s.trim())
            .ok_or_else(|| format!("unknown evidence level '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::A, Grade::B, Grade::C, Grade::D];

    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            Grade::A
        } else if score >= 55.0 {
            Grade::B
        } else if score >= 35.0 {
            Grade::C
        } else {
            Grade::D
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Grade::A => "High quality (>=75)",
            Grade::B => "Moderate quality (55-74)",
            Grade::C => "Low quality (35-54)",
            Grade::D => "Very low quality (<35)",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown grade '{s}'"))
    }
}

// ── Study-type patterns ──────────────────────────────────────────────────────

/// Priority order matters: earlier entries shadow later ones.
pub const STUDY_TYPE_PATTERNS: &[(StudyType, &[&str])] = &[
    (StudyType::MetaAnalysis, &[
        r"meta-analysis", r"meta analysis", r"metaanalysis",
        r"systematic review and meta", r"pooled analysis",
    ]),
    (StudyType::SystematicReview, &[
        r"systematic review", r"cochrane review", r"umbrella review",
    ]),
    (StudyType::Guideline, &[
        r"guideline", r"clinical practice guideline", r"consensus statement",
        r"position statement", r"recommendation",
    ]),
    (StudyType::Rct, &[
        r"randomized controlled trial", r"randomised controlled trial",
        r"\brct\b", r"randomized trial", r"randomised trial",
        r"double-blind", r"placebo-controlled", r"controlled clinical trial",
    ]),
    (StudyType::Cohort, &[
        r"cohort study", r"prospective study", r"longitudinal study",
        r"follow-up study", r"prospective cohort",
    ]),
    (StudyType::CaseControl, &[r"case-control", r"case control study"]),
    (StudyType::CrossSectional, &[r"cross-sectional", r"cross sectional study"]),
    (StudyType::CaseReport, &[r"case report", r"case series"]),
    (StudyType::Review, &[r"\breview\b", r"narrative review", r"literature review"]),
];

pub struct StudyTypeTable {
    entries: Vec<(StudyType, Vec<Regex>)>,
}

impl StudyTypeTable {
    pub fn from_patterns(patterns: &[(StudyType, &[&str])]) -> Result<Self, regex::Error> {
        let entries = patterns
            .iter()
            .map(|(ty, pats)| {
                let compiled = pats
                    .iter()
                    .map(|p| Regex::new(&format!("(?i){p}")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*ty, compiled))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { entries })
    }

    /// First type in priority order with a matching pattern, else `Other`.
    pub fn identify(&self, text: &str) -> StudyType {
        self.entries
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
            .map(|(ty, _)| *ty)
            .unwrap_or(StudyType::Other)
    }
}

lazy_static! {
    pub static ref BUILTIN_STUDY_TYPES: StudyTypeTable =
        StudyTypeTable::from_patterns(STUDY_TYPE_PATTERNS).unwrap();
}

// ── Venue impact factors ─────────────────────────────────────────────────────

const JOURNAL_IMPACT: &[(&str, f64)] = &[
    ("new england journal of medicine", 176.079),
    ("lancet",                          168.9),
    ("jama",                            120.7),
    ("bmj",                             93.6),
    ("nature medicine",                 82.9),
    ("nature",                          69.5),
    ("science",                         63.7),
    ("cell",                            66.8),
    ("annals of internal medicine",     51.6),
    ("lancet oncology",                 51.1),
    ("lancet neurology",                48.0),
    ("lancet infectious diseases",      36.4),
    ("lancet respiratory medicine",     38.0),
    ("lancet gastroenterology hepatology", 35.0),
    ("lancet diabetes endocrinology",   44.8),
    ("lancet psychiatry",               30.8),
    ("jama internal medicine",          39.4),
    ("jama oncology",                   33.0),
    ("jama neurology",                  29.0),
    ("jama surgery",                    16.9),
    ("jama psychiatry",                 25.9),
    ("jama dermatology",                11.8),
    ("jama pediatrics",                 16.2),
    ("gastroenterology",                33.8),
    ("gut",                             31.8),
    ("hepatology",                      17.4),
    ("circulation",                     37.8),
    ("european heart journal",          39.3),
    ("stroke",                          10.2),
    ("neurology",                       12.3),
    ("brain",                           15.3),
    ("pain",                            7.9),
    ("spine",                           3.5),
    ("journal of bone and joint surgery", 5.3),
    ("arthritis rheumatology",          15.9),
    ("annals of the rheumatic diseases", 27.9),
    ("fertility and sterility",         7.3),
    ("obstetrics gynecology",           7.2),
    ("american journal of obstetrics gynecology", 9.8),
    ("journal of dental research",      7.6),
    ("journal of periodontology",       6.2),
    ("plos one",                        3.7),
    ("plos medicine",                   15.9),
    ("bmc medicine",                    11.1),
    ("scientific reports",              4.9),
    ("frontiers",                       3.5),
    ("bmc",                             3.0),
];

/// Checked in order when no table entry matches.
const BRAND_FALLBACKS: &[(&str, f64)] = &[
    ("lancet", 30.0),
    ("nature", 25.0),
    ("jama", 20.0),
    ("bmj", 15.0),
    ("frontiers", 3.5),
    ("plos", 4.0),
    ("bmc", 3.0),
];

pub const DEFAULT_IMPACT_FACTOR: f64 = 2.0;

/// Venue name → impact factor.
///
/// Names are normalised (lower case, punctuation dropped, `and`/`the`
/// removed) on both sides. An exact match wins, then the longest table name
/// contained in the venue, then the shortest table name containing the
/// venue. An empty venue never matches.
#[derive(Debug, Clone)]
pub struct ImpactTable {
    entries: Vec<(String, f64)>,
}

impl Default for ImpactTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ImpactTable {
    pub fn builtin() -> Self {
        Self {
            entries: JOURNAL_IMPACT
                .iter()
                .map(|(name, factor)| (normalise_venue(name), *factor))
                .collect(),
        }
    }

    /// Replace or add entries. Later overrides win.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        for (name, factor) in overrides {
            let key = normalise_venue(name);
            if key.is_empty() {
                continue;
            }
            match self.entries.iter_mut().find(|(n, _)| *n == key) {
                Some(entry) => entry.1 = *factor,
                None => self.entries.push((key, *factor)),
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, venue: &str) -> f64 {
        let venue = normalise_venue(venue);
        if venue.is_empty() {
            return DEFAULT_IMPACT_FACTOR;
        }

        if let Some((_, factor)) = self.entries.iter().find(|(name, _)| *name == venue) {
            return *factor;
        }

        let padded_venue = format!(" {venue} ");
        let contained = self
            .entries
            .iter()
            .filter(|(name, _)| padded_venue.contains(&format!(" {name} ")))
            .max_by_key(|(name, _)| name.len());
        if let Some((_, factor)) = contained {
            return *factor;
        }

        let containing = self
            .entries
            .iter()
            .filter(|(name, _)| format!(" {name} ").contains(&padded_venue))
            .min_by_key(|(name, _)| name.len());
        if let Some((_, factor)) = containing {
            return *factor;
        }

        BRAND_FALLBACKS
            .iter()
            .find(|(brand, _)| venue.contains(brand))
            .map(|(_, factor)| *factor)
            .unwrap_or(DEFAULT_IMPACT_FACTOR)
    }
}

fn normalise_venue(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| *w != "and" && *w != "the")
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_priority_order_first_match_wins() {
        let table = &*BUILTIN_STUDY_TYPES;
        assert_eq!(
            table.identify("a systematic review and meta-analysis of randomized controlled trials"),
            StudyType::MetaAnalysis
        );
        assert_eq!(
            table.identify("Cochrane review of randomised trials"),
            StudyType::SystematicReview
        );
        assert_eq!(table.identify("a double-blind study"), StudyType::Rct);
        assert_eq!(table.identify("nothing to see here"), StudyType::Other);
    }

    #[test]
    fn test_word_boundaries_respected() {
        let table = &*BUILTIN_STUDY_TYPES;
        // "reviewed" must not count as a review.
        assert_eq!(table.identify("charts were reviewed"), StudyType::Other);
        assert_eq!(table.identify("an RCT in adults"), StudyType::Rct);
        assert_eq!(table.identify("the rctx trial"), StudyType::Other);
    }

    #[test]
    fn test_evidence_levels_follow_type() {
        assert_eq!(StudyType::Guideline.evidence_level(), EvidenceLevel::L1a);
        assert_eq!(StudyType::Rct.evidence_level(), EvidenceLevel::L1b);
        assert_eq!(StudyType::CaseReport.evidence_level(), EvidenceLevel::L4);
        assert_eq!(StudyType::Other.evidence_level(), EvidenceLevel::L5);
    }

    #[test]
    fn test_string_forms_round_trip() {
        for ty in StudyType::ALL {
            assert_eq!(ty.as_str().parse::<StudyType>().unwrap(), ty);
        }
        assert_eq!("2b".parse::<EvidenceLevel>().unwrap(), EvidenceLevel::L2b);
        assert_eq!("c".parse::<Grade>().unwrap(), Grade::C);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_score(75.0), Grade::A);
        assert_eq!(Grade::from_score(74.9), Grade::B);
        assert_eq!(Grade::from_score(55.0), Grade::B);
        assert_eq!(Grade::from_score(35.0), Grade::C);
        assert_eq!(Grade::from_score(34.9), Grade::D);
    }

    #[test]
    fn test_impact_lookup_prefers_most_specific() {
        let table = ImpactTable::builtin();
        assert_eq!(table.lookup("The Lancet. Oncology"), 51.1);
        assert_eq!(table.lookup("Lancet (London, England)"), 168.9);
        assert_eq!(table.lookup("JAMA internal medicine"), 39.4);
        assert_eq!(table.lookup("The Lancet Gastroenterology & Hepatology"), 35.0);
        assert_eq!(table.lookup("Arthritis & rheumatology (Hoboken, N.J.)"), 15.9);
    }

    #[test]
    fn test_impact_lookup_fallbacks() {
        let table = ImpactTable::builtin();
        assert_eq!(table.lookup("PLoS biology"), 4.0);
        assert_eq!(table.lookup("Journal of Obscure Studies"), DEFAULT_IMPACT_FACTOR);
        assert_eq!(table.lookup(""), DEFAULT_IMPACT_FACTOR);
        assert_eq!(table.lookup("   "), DEFAULT_IMPACT_FACTOR);
    }

    #[test]
    fn test_whole_word_matching_for_short_names() {
        let table = ImpactTable::builtin();
        // "pain" must not match inside "spain".
        assert_eq!(table.lookup("Revista de Spain Medicina"), DEFAULT_IMPACT_FACTOR);
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Journal of Pain Research".to_string(), 2.8);
        overrides.insert("gut".to_string(), 24.5);
        let table = ImpactTable::builtin().with_overrides(&overrides);

        assert_eq!(table.lookup("Journal of pain research"), 2.8);
        assert_eq!(table.lookup("Gut"), 24.5);
        assert_eq!(table.len(), ImpactTable::builtin().len() + 1);
    }
}
