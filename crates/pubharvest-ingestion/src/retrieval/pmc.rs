//! PubMed Central full text.
//!
//! Tries `/articles/{PMCID}/pdf/`, then `/pdf/main.pdf`, then scrapes the
//! article page for a PDF link.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use pubharvest_common::{Result, Service};

use super::{Downloader, FetchStrategy};
use crate::models::PaperRecord;
use crate::sources::idconv::IdConverter;
use crate::sources::normalise_pmcid;

pub const SOURCE_NAME: &str = "PMC";

/// Links scraped from the article page, most trusted first.
pub fn extract_pdf_links(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let mut links = Vec::new();

    let resolve = |raw: &str| -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match &base {
            Some(base) => base.join(raw).ok().map(|u| u.to_string()),
            None => Url::parse(raw).ok().map(|u| u.to_string()),
        }
    };

    if let Ok(meta) = Selector::parse(r#"meta[name="citation_pdf_url"]"#) {
        for el in document.select(&meta) {
            if let Some(url) = el.value().attr("content").and_then(resolve) {
                links.push(url);
            }
        }
    }

    if let Ok(anchors) = Selector::parse("a[href]") {
        for el in document.select(&anchors) {
            let Some(href) = el.value().attr("href") else { continue };
            let path = href.split(['?', '#']).next().unwrap_or_default();
            if !path.to_ascii_lowercase().ends_with(".pdf") {
                continue;
            }
            if let Some(url) = resolve(href) {
                if !links.contains(&url) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Shared download logic for both PMC strategies.
async fn fetch_from_pmc(
    articles_base: &str,
    pmc_id: &str,
    downloader: &Downloader,
) -> Result<Option<Vec<u8>>> {
    let pmc_id = normalise_pmcid(pmc_id);
    let article_url = format!("{articles_base}/{pmc_id}/");

    for url in [format!("{article_url}pdf/"), format!("{article_url}pdf/main.pdf")] {
        match downloader.fetch_pdf(Service::Ncbi, &url, &[]).await {
            Ok(Some(bytes)) => return Ok(Some(bytes)),
            Ok(None) => {}
            Err(e) => debug!(url, error = %e, "PMC PDF request failed"),
        }
    }

    // Relative links resolve against the page actually served.
    let page = downloader.http().get_page(Service::Ncbi, &article_url, &[]).await?;
    for link in extract_pdf_links(&page.text(), &page.final_url) {
        match downloader.fetch_pdf(Service::Ncbi, &link, &[]).await {
            Ok(Some(bytes)) => return Ok(Some(bytes)),
            Ok(None) => {}
            Err(e) => debug!(url = %link, error = %e, "scraped PDF link failed"),
        }
    }
    Ok(None)
}

/// Records that already carry a PMC id.
pub struct PmcDirect {
    articles_base: String,
}

impl PmcDirect {
    pub fn new(articles_base: &str) -> Self {
        Self {
            articles_base: articles_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FetchStrategy for PmcDirect {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn attempt(&self, record: &mut PaperRecord, downloader: &Downloader) -> Result<Option<Vec<u8>>> {
        let Some(pmc_id) = record.pmc_id.clone().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        fetch_from_pmc(&self.articles_base, &pmc_id, downloader).await
    }
}

/// Records without a PMC id: translate the PMID first and keep the result.
pub struct PmcTranslated {
    articles_base: String,
    idconv: IdConverter,
}

impl PmcTranslated {
    pub fn new(articles_base: &str, idconv: IdConverter) -> Self {
        Self {
            articles_base: articles_base.trim_end_matches('/').to_string(),
            idconv,
        }
    }
}

#[async_trait]
impl FetchStrategy for PmcTranslated {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn attempt(&self, record: &mut PaperRecord, downloader: &Downloader) -> Result<Option<Vec<u8>>> {
        if record.pmc_id.as_deref().is_some_and(|id| !id.is_empty()) || record.pmid.is_empty() {
            return Ok(None);
        }
        let Some(pmc_id) = self.idconv.pmid_to_pmcid(&record.pmid).await? else {
            return Ok(None);
        };
        debug!(pmid = %record.pmid, %pmc_id, "translated PMID");
        record.pmc_id = Some(pmc_id.clone());
        fetch_from_pmc(&self.articles_base, &pmc_id, downloader).await
    }
}
