//! Citation index clients.

pub mod idconv;
pub mod pubmed;

use async_trait::async_trait;
use pubharvest_common::Result;

use crate::models::PaperRecord;

/// The searchable index a category pipeline draws candidates from.
#[async_trait]
pub trait CitationIndex: Send + Sync {
    /// PubMed ids for `term` restricted to free full text, by relevance.
    async fn search_free_fulltext(&self, term: &str, retmax: usize) -> Result<Vec<String>>;

    /// PMC ids for `term` restricted to the open-access subset.
    async fn search_open_access(&self, term: &str, retmax: usize) -> Result<Vec<String>>;

    /// PubMed ids for the given PMC ids, in input order; unknown ids are skipped.
    async fn pmcids_to_pmids(&self, pmcids: &[String]) -> Result<Vec<String>>;

    /// Bibliographic records for one batch of PubMed ids.
    async fn fetch_records(&self, pmids: &[String]) -> Result<Vec<PaperRecord>>;
}

/// `PMC` prefix added when missing.
pub fn normalise_pmcid(id: &str) -> String {
    let id = id.trim();
    match id.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("pmc") => format!("PMC{}", &id[3..]),
        _ => format!("PMC{id}"),
    }
}
