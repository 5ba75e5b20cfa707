//! On-disk document names.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::PaperRecord;

const MAX_TITLE_CHARS: usize = 45;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[<>:"/\\|?*\[\]{}()'\x00-\x1f\x7f]"#).unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    pub static ref PMID_IN_NAME: Regex = Regex::new(r"PMID(\d+)").unwrap();
}

/// `PMID{id}_{year|XXXX}_{title}.pdf`
pub fn document_filename(record: &PaperRecord) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(&record.title, "");
    let title: String = WHITESPACE_RUN
        .replace_all(cleaned.trim(), "_")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    let id = if !record.pmid.is_empty() {
        record.pmid.clone()
    } else if let Some(pmc) = record.pmc_id.as_deref().filter(|p| !p.is_empty()) {
        pmc.to_string()
    } else {
        let digest = Sha256::digest(record.title.as_bytes());
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    };

    let year = if record.year.trim().is_empty() {
        "XXXX"
    } else {
        record.year.trim()
    };

    format!("PMID{id}_{year}_{title}.pdf")
}

/// PubMed id embedded in a document name, if any.
pub fn pmid_from_filename(name: &str) -> Option<String> {
    PMID_IN_NAME.captures(name).map(|c| c[1].to_string())
}
