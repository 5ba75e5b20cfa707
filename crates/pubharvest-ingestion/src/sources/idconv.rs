//! NCBI PMC ID converter client.
//! Maps PMIDs and PMCIDs onto each other, up to 200 ids per request.

use pubharvest_common::{HarvestClient, Result, Service};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use super::normalise_pmcid;

const MAX_IDS_PER_REQUEST: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub pmid: Option<String>,
    #[serde(default)]
    pub pmcid: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default, rename = "requested-id", deserialize_with = "string_or_number")]
    pub requested_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdConvResponse {
    #[serde(default)]
    records: Vec<IdRecord>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Clone)]
pub struct IdConverter {
    http: HarvestClient,
    url: String,
    tool: String,
    email: String,
}

impl IdConverter {
    pub fn new(http: HarvestClient, url: &str, tool: &str, email: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
            tool: tool.to_string(),
            email: email.to_string(),
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn convert(&self, ids: &[String]) -> Result<Vec<IdRecord>> {
        let mut out = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_REQUEST) {
            let params = vec![
                ("ids", batch.join(",")),
                ("format", "json".to_string()),
                ("tool", self.tool.clone()),
                ("email", self.email.clone()),
            ];
            let resp: IdConvResponse = self.http.get_json(Service::Ncbi, &self.url, &params).await?;
            out.extend(resp.records);
        }
        debug!(converted = out.len(), "ID converter returned records");
        Ok(out)
    }

    pub async fn pmid_to_pmcid(&self, pmid: &str) -> Result<Option<String>> {
        let records = self.convert(&[pmid.to_string()]).await?;
        Ok(records
            .into_iter()
            .find_map(|r| r.pmcid)
            .map(|id| normalise_pmcid(&id)))
    }

    /// PMIDs for `pmcids` in input order; ids without a PubMed entry are dropped.
    pub async fn pmcids_to_pmids(&self, pmcids: &[String]) -> Result<Vec<String>> {
        let normalised: Vec<String> = pmcids.iter().map(|id| normalise_pmcid(id)).collect();
        let records = self.convert(&normalised).await?;
        Ok(normalised
            .iter()
            .filter_map(|pmcid| {
                records
                    .iter()
                    .find(|r| r.pmcid.as_deref() == Some(pmcid.as_str()))
                    .and_then(|r| r.pmid.clone())
            })
            .collect())
    }
}
