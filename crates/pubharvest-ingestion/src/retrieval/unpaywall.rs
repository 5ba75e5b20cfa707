//! Unpaywall open-access locations, looked up by DOI.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use pubharvest_common::{Result, Service};

use super::{Downloader, FetchStrategy};
use crate::models::PaperRecord;

pub const SOURCE_NAME: &str = "Unpaywall";

#[derive(Debug, Default, Deserialize)]
pub struct UnpaywallResponse {
    #[serde(default)]
    pub is_oa: bool,
    #[serde(default)]
    pub oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OaLocation {
    #[serde(default)]
    pub url_for_pdf: Option<String>,
}

impl UnpaywallResponse {
    /// PDF links in the order Unpaywall ranks them. Empty unless open access.
    pub fn pdf_urls(&self) -> Vec<&str> {
        if !self.is_oa {
            return Vec::new();
        }
        self.oa_locations
            .iter()
            .filter_map(|loc| loc.url_for_pdf.as_deref())
            .filter(|url| !url.trim().is_empty())
            .collect()
    }
}

pub struct UnpaywallResolver {
    base: String,
    email: String,
}

impl UnpaywallResolver {
    pub fn new(base: &str, email: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            email: email.to_string(),
        }
    }
}

#[async_trait]
impl FetchStrategy for UnpaywallResolver {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn attempt(&self, record: &mut PaperRecord, downloader: &Downloader) -> Result<Option<Vec<u8>>> {
        let Some(doi) = record.doi.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        let lookup = format!("{}/{}", self.base, doi);
        let response: UnpaywallResponse = downloader
            .http()
            .get_json(Service::Unpaywall, &lookup, &[("email", self.email.clone())])
            .await?;

        for url in response.pdf_urls() {
            match downloader.fetch_pdf(Service::Other, url, &[]).await {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(e) => debug!(url, error = %e, "open-access location failed"),
            }
        }
        Ok(None)
    }
}
