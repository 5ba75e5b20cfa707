//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: {eutils}/esearch.fcgi  (db=pubmed free full text, db=pmc open access)
//!   efetch:  {eutils}/efetch.fcgi   (PubmedArticleSet XML)

use async_trait::async_trait;
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use pubharvest_common::{HarvestClient, HarvestError, HarvestSettings, Result, Service};

use super::idconv::IdConverter;
use super::{normalise_pmcid, CitationIndex};
use crate::models::PaperRecord;

const MAX_AUTHORS: usize = 6;
const MAX_KEYWORDS: usize = 15;

pub struct PubMedClient {
    http: HarvestClient,
    eutils_base: String,
    tool: String,
    email: String,
    api_key: Option<String>,
    idconv: IdConverter,
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

impl PubMedClient {
    pub fn new(
        http: HarvestClient,
        eutils_base: &str,
        settings: &HarvestSettings,
        idconv: IdConverter,
    ) -> Self {
        Self {
            http,
            eutils_base: eutils_base.trim_end_matches('/').to_string(),
            tool: settings.tool_name.clone(),
            email: settings.contact_email.clone(),
            api_key: settings.ncbi_api_key.clone(),
            idconv,
        }
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tool", self.tool.clone()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search `db` and return the id list in relevance order.
    #[instrument(skip(self))]
    pub async fn esearch(&self, db: &str, term: &str, retmax: usize) -> Result<Vec<String>> {
        let mut params = self.base_params();
        params.push(("db", db.to_string()));
        params.push(("term", term.to_string()));
        params.push(("retmax", retmax.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", "relevance".to_string()));

        let url = format!("{}/esearch.fcgi", self.eutils_base);
        let resp: EsearchResponse = self.http.get_json(Service::Ncbi, &url, &params).await?;

        debug!(count = resp.esearchresult.idlist.len(), "esearch returned ids");
        Ok(resp.esearchresult.idlist)
    }

    /// Fetch PubMed XML for a batch of PMIDs and parse it.
    #[instrument(skip(self, pmids), fields(count = pmids.len()))]
    pub async fn efetch(&self, pmids: &[String]) -> Result<Vec<PaperRecord>> {
        if pmids.is_empty() {
            return Ok(vec![]);
        }

        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "xml".to_string()));
        params.push(("retmode", "xml".to_string()));

        let url = format!("{}/efetch.fcgi", self.eutils_base);
        let xml = self.http.get_text(Service::Ncbi, &url, &params).await?;
        parse_pubmed_xml(&xml)
    }
}

#[async_trait]
impl CitationIndex for PubMedClient {
    async fn search_free_fulltext(&self, term: &str, retmax: usize) -> Result<Vec<String>> {
        let query = format!("({term}) AND \"free full text\"[filter]");
        self.esearch("pubmed", &query, retmax).await
    }

    async fn search_open_access(&self, term: &str, retmax: usize) -> Result<Vec<String>> {
        let query = format!("({term}) AND \"open access\"[filter]");
        let ids = self.esearch("pmc", &query, retmax).await?;
        Ok(ids.iter().map(|id| normalise_pmcid(id)).collect())
    }

    async fn pmcids_to_pmids(&self, pmcids: &[String]) -> Result<Vec<String>> {
        self.idconv.pmcids_to_pmids(pmcids).await
    }

    async fn fetch_records(&self, pmids: &[String]) -> Result<Vec<PaperRecord>> {
        self.efetch(pmids).await
    }
}

// ── XML parsing ──────────────────────────────────────────────────────────────

lazy_static! {
    static ref FOUR_DIGIT_YEAR: Regex = Regex::new(r"(\d{4})").unwrap();
}

/// Fields gathered while walking one `<PubmedArticle>`.
#[derive(Default)]
struct ArticleDraft {
    pmid: Option<String>,
    title: String,
    journal: String,
    year: String,
    month: String,
    medline_date: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    author_count: usize,
    last_name: String,
    initials: String,
    doi: Option<String>,
    eloc_doi: Option<String>,
    pmc_id: Option<String>,
    publication_types: Vec<String>,
    keywords: Vec<String>,
    mesh_terms: Vec<String>,
}

impl ArticleDraft {
    fn into_record(self) -> Option<PaperRecord> {
        let pmid = self.pmid?;
        let mut record = PaperRecord::new(pmid);

        record.title = self.title;
        record.journal = self.journal;
        record.year = if self.year.is_empty() {
            FOUR_DIGIT_YEAR
                .captures(&self.medline_date)
                .map(|c| c[1].to_string())
                .unwrap_or_default()
        } else {
            self.year
        };
        record.month = self.month;

        record.authors = self.authors.join(", ");
        if self.author_count > MAX_AUTHORS {
            record.authors.push_str(" et al.");
        }

        record.abstract_text = self.abstract_parts.join(" ");
        record.doi = self.doi.or(self.eloc_doi);
        record.is_free_fulltext = self.pmc_id.is_some();
        record.pmc_id = self.pmc_id;
        record.publication_types = self.publication_types.join("; ");
        record.keywords = self
            .keywords
            .into_iter()
            .chain(self.mesh_terms)
            .take(MAX_KEYWORDS)
            .collect::<Vec<_>>()
            .join("; ");

        Some(record)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Elements whose text content is collected.
fn is_captured(name: &[u8]) -> bool {
    matches!(
        name,
        b"PMID"
            | b"ArticleTitle"
            | b"Title"
            | b"Year"
            | b"Month"
            | b"MedlineDate"
            | b"AbstractText"
            | b"LastName"
            | b"Initials"
            | b"ArticleId"
            | b"ELocationID"
            | b"PublicationType"
            | b"Keyword"
            | b"DescriptorName"
    )
}

/// Parse a PubmedArticleSet document.
///
/// Articles without a PMID are dropped. Inline markup inside titles and
/// abstracts contributes its text; ids nested in reference lists are ignored.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut records = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<ArticleDraft> = None;
    let mut text = String::new();
    // Label / IdType / EIdType of the captured element currently open.
    let mut current_attr: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| HarvestError::Parse(format!("PubMed XML at {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => current = Some(ArticleDraft::default()),
                    b"Author" => {
                        if let Some(draft) = current.as_mut() {
                            draft.last_name.clear();
                            draft.initials.clear();
                        }
                    }
                    b"AbstractText" => current_attr = attr(&e, "Label"),
                    b"ArticleId" => current_attr = attr(&e, "IdType"),
                    b"ELocationID" => current_attr = attr(&e, "EIdType"),
                    _ => {}
                }
                if is_captured(&name) {
                    text.clear();
                }
                stack.push(name);
            }
            Event::Text(e) => {
                if current.is_some() {
                    let chunk = e
                        .unescape()
                        .map_err(|err| HarvestError::Parse(format!("PubMed XML text: {err}")))?;
                    text.push_str(&chunk);
                }
            }
            Event::CData(e) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else { continue };
                let parent = stack.last().map(|p| p.as_slice()).unwrap_or_default();
                let in_reference = stack.iter().any(|n| n.as_slice() == b"Reference");

                if name.as_slice() == b"PubmedArticle" {
                    if let Some(record) = current.take().and_then(ArticleDraft::into_record) {
                        records.push(record);
                    } else {
                        warn!("Skipping PubmedArticle without PMID");
                    }
                    continue;
                }

                let Some(draft) = current.as_mut() else { continue };
                let value = || collapse_whitespace(&text);

                match (name.as_slice(), parent) {
                    (b"PMID", b"MedlineCitation") if draft.pmid.is_none() => {
                        let v = value();
                        if !v.is_empty() {
                            draft.pmid = Some(v);
                        }
                    }
                    (b"ArticleTitle", b"Article") => draft.title = value(),
                    (b"Title", b"Journal") => draft.journal = value(),
                    (b"Year", b"PubDate") if draft.year.is_empty() => draft.year = value(),
                    (b"Month", b"PubDate") if draft.month.is_empty() => draft.month = value(),
                    (b"MedlineDate", b"PubDate") if draft.medline_date.is_empty() => {
                        draft.medline_date = value()
                    }
                    (b"AbstractText", b"Abstract") => {
                        let v = value();
                        if !v.is_empty() {
                            match current_attr.take().filter(|l| !l.trim().is_empty()) {
                                Some(label) => draft.abstract_parts.push(format!("{label}: {v}")),
                                None => draft.abstract_parts.push(v),
                            }
                        }
                    }
                    (b"LastName", b"Author") => draft.last_name = value(),
                    (b"Initials", b"Author") => draft.initials = value(),
                    (b"Author", b"AuthorList") => {
                        draft.author_count += 1;
                        if draft.author_count <= MAX_AUTHORS && !draft.last_name.is_empty() {
                            let name = if draft.initials.is_empty() {
                                draft.last_name.clone()
                            } else {
                                format!("{} {}", draft.last_name, draft.initials)
                            };
                            draft.authors.push(name);
                        }
                    }
                    (b"ArticleId", _) if !in_reference => {
                        let v = value();
                        match current_attr.take().as_deref() {
                            Some("doi") if draft.doi.is_none() && !v.is_empty() => draft.doi = Some(v),
                            Some("pmc") if draft.pmc_id.is_none() && !v.is_empty() => {
                                draft.pmc_id = Some(normalise_pmcid(&v))
                            }
                            _ => {}
                        }
                    }
                    (b"ELocationID", _) => {
                        let v = value();
                        if current_attr.take().as_deref() == Some("doi")
                            && draft.eloc_doi.is_none()
                            && !v.is_empty()
                        {
                            draft.eloc_doi = Some(v);
                        }
                    }
                    (b"PublicationType", b"PublicationTypeList") => {
                        let v = value();
                        if !v.is_empty() {
                            draft.publication_types.push(v);
                        }
                    }
                    (b"Keyword", b"KeywordList") => {
                        let v = value();
                        if !v.is_empty() {
                            draft.keywords.push(v);
                        }
                    }
                    (b"DescriptorName", b"MeshHeading") => {
                        let v = value();
                        if !v.is_empty() {
                            draft.mesh_terms.push(v);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}
