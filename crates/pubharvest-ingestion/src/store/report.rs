//! Plain-text run report.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::path::Path;

use pubharvest_grading::{EvidenceLevel, Grade, StudyType};

use crate::models::{CategoryStats, PaperRecord};

const WIDE_RULE: usize = 75;
const NARROW_RULE: usize = 50;
const TITLE_PREVIEW_CHARS: usize = 70;

/// Run-level facts printed in the report header.
#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub generated_at: DateTime<Utc>,
    pub contact_email: &'a str,
    pub base_dir: &'a Path,
    pub default_target: usize,
    pub top_n: usize,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

/// One block per two percent.
fn bar(pct: f64) -> String {
    "█".repeat((pct / 2.0) as usize)
}

pub fn render_report(header: &ReportHeader<'_>, records: &[PaperRecord], stats: &[CategoryStats]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, header, records, stats);
    out
}

fn write_report(
    out: &mut String,
    header: &ReportHeader<'_>,
    records: &[PaperRecord],
    stats: &[CategoryStats],
) -> fmt::Result {
    let total = records.len();
    let wide = "=".repeat(WIDE_RULE);

    writeln!(out, "{wide}")?;
    writeln!(out, "          Literature harvest and evidence grading report")?;
    writeln!(out, "{wide}")?;
    writeln!(out, "Generated: {}", header.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "Contact:   {}", header.contact_email)?;
    writeln!(out, "Directory: {}", header.base_dir.display())?;
    writeln!(out, "Target per category: {}", header.default_target)?;
    writeln!(out)?;

    writeln!(out, "[Overall]")?;
    writeln!(out, "{}", "-".repeat(NARROW_RULE))?;
    writeln!(out, "  Categories:        {}", stats.len())?;
    writeln!(out, "  Papers:            {total}")?;
    writeln!(out, "  Already on disk:   {}", stats.iter().map(|s| s.existing_valid).sum::<usize>())?;
    writeln!(out, "  Newly downloaded:  {}", stats.iter().map(|s| s.new_downloaded).sum::<usize>())?;
    writeln!(out, "  Failed downloads:  {}", stats.iter().map(|s| s.failed).sum::<usize>())?;
    writeln!(out, "  Untracked on disk: {}", stats.iter().map(|s| s.untracked).sum::<usize>())?;
    writeln!(out)?;

    writeln!(out, "[Per category]")?;
    writeln!(out, "{}", "-".repeat(WIDE_RULE))?;
    writeln!(
        out,
        "{:<28} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
        "Category", "Target", "Exist", "New", "Failed", "Total", "Note"
    )?;
    writeln!(out, "{}", "-".repeat(WIDE_RULE))?;
    for s in stats {
        let note = match (&s.error, s.cancelled, s.closed_short) {
            (Some(_), _, _) => "error",
            (None, true, _) => "cancelled",
            (None, false, true) => "short",
            (None, false, false) => "",
        };
        writeln!(
            out,
            "{:<28} {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
            s.label, s.target, s.existing_valid, s.new_downloaded, s.failed, s.total, note
        )?;
    }
    writeln!(out)?;

    let mut levels: BTreeMap<EvidenceLevel, usize> = BTreeMap::new();
    let mut grades: BTreeMap<Grade, usize> = BTreeMap::new();
    let mut types: BTreeMap<StudyType, usize> = BTreeMap::new();
    for r in records {
        *levels.entry(r.evidence_level).or_default() += 1;
        *grades.entry(r.grade).or_default() += 1;
        *types.entry(r.study_type).or_default() += 1;
    }

    writeln!(out, "[Evidence levels]")?;
    writeln!(out, "{}", "-".repeat(NARROW_RULE))?;
    for (level, count) in &levels {
        let pct = percent(*count, total);
        writeln!(
            out,
            "  Level {:<2}: {:>5} ({:>5.1}%) {} {}",
            level.as_str(),
            count,
            pct,
            bar(pct),
            level.description()
        )?;
    }
    writeln!(out)?;

    writeln!(out, "[Grades]")?;
    writeln!(out, "{}", "-".repeat(NARROW_RULE))?;
    for grade in Grade::ALL {
        let count = grades.get(&grade).copied().unwrap_or(0);
        let pct = percent(count, total);
        writeln!(
            out,
            "  Grade {} ({}): {:>5} ({:>5.1}%) {}",
            grade,
            grade.description(),
            count,
            pct,
            bar(pct)
        )?;
    }
    writeln!(out)?;

    writeln!(out, "[Study types]")?;
    writeln!(out, "{}", "-".repeat(NARROW_RULE))?;
    let mut by_count: Vec<(StudyType, usize)> = types.into_iter().collect();
    by_count.sort_by(|a, b| b.1.cmp(&a.1));
    for (study_type, count) in by_count {
        writeln!(out, "  {}: {} ({:.1}%)", study_type, count, percent(count, total))?;
    }
    writeln!(out)?;

    writeln!(out, "[Top {} by quality score]", header.top_n)?;
    writeln!(out, "{}", "-".repeat(WIDE_RULE))?;
    let mut ranked: Vec<&PaperRecord> = records.iter().collect();
    ranked.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    for (i, p) in ranked.into_iter().take(header.top_n).enumerate() {
        let title: String = p.title.chars().take(TITLE_PREVIEW_CHARS).collect();
        let ellipsis = if p.title.chars().count() > TITLE_PREVIEW_CHARS { "..." } else { "" };
        writeln!(out)?;
        writeln!(out, "{}. [{}] Level {} / Grade {}", i + 1, p.category_label, p.evidence_level, p.grade)?;
        writeln!(
            out,
            "   Score: {:.1} | Impact: {:.1} | Type: {}",
            p.quality_score, p.impact_factor, p.study_type
        )?;
        writeln!(out, "   PMID: {}", p.pmid)?;
        writeln!(out, "   Title: {title}{ellipsis}")?;
        writeln!(out, "   Journal: {}", p.journal)?;
        writeln!(out, "   Year: {}", p.year)?;
    }
    Ok(())
}
