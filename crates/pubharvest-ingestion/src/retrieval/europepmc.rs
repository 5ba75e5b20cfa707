//! Europe PMC rendered PDFs.

use async_trait::async_trait;

use pubharvest_common::{Result, Service};

use super::{Downloader, FetchStrategy};
use crate::models::PaperRecord;
use crate::sources::normalise_pmcid;

pub const SOURCE_NAME: &str = "EuropePMC";

pub struct EuropePmcMirror {
    articles_base: String,
}

impl EuropePmcMirror {
    pub fn new(articles_base: &str) -> Self {
        Self {
            articles_base: articles_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn render_url(&self, pmc_id: &str) -> String {
        format!("{}/{}", self.articles_base, normalise_pmcid(pmc_id))
    }
}

#[async_trait]
impl FetchStrategy for EuropePmcMirror {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn attempt(&self, record: &mut PaperRecord, downloader: &Downloader) -> Result<Option<Vec<u8>>> {
        let Some(pmc_id) = record.pmc_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let url = self.render_url(pmc_id);
        downloader
            .fetch_pdf(Service::EuropePmc, &url, &[("pdf", "render".to_string())])
            .await
    }
}
