//! Configuration loading for pubharvest.
//! Reads pubharvest.toml from the current directory or the path in PUBHARVEST_CONFIG.
//! A missing file yields the defaults and the built-in category catalog.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::categories::{builtin_categories, DiseaseCategory};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub harvest: HarvestSettings,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default = "builtin_categories")]
    pub categories: Vec<DiseaseCategory>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestSettings::default(),
            rate_limits: RateLimitConfig::default(),
            endpoints: EndpointConfig::default(),
            grading: GradingConfig::default(),
            categories: builtin_categories(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSettings {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Sent to NCBI and Unpaywall, and in the User-Agent.
    #[serde(default = "default_contact_email")]
    pub contact_email: String,
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    /// Optional NCBI API key for higher E-utilities rate limits.
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    #[serde(default = "default_papers_per_category")]
    pub papers_per_category: usize,
    /// Extra candidates searched beyond the shortfall.
    #[serde(default = "default_overshoot_margin")]
    pub overshoot_margin: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_min_valid_bytes")]
    pub min_valid_bytes: u64,
    #[serde(default = "default_detail_batch_size")]
    pub detail_batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "default_concurrency")]
    pub search_concurrency: usize,
    #[serde(default = "default_report_top_n")]
    pub report_top_n: usize,
}

fn default_base_dir()              -> PathBuf { PathBuf::from("./papers") }
fn default_contact_email()         -> String  { "pubharvest@example.org".to_string() }
fn default_tool_name()             -> String  { "pubharvest".to_string() }
fn default_papers_per_category()   -> usize   { 200 }
fn default_overshoot_margin()      -> usize   { 80 }
fn default_max_retries()           -> u32     { 3 }
fn default_retry_backoff_ms()      -> u64     { 2_000 }
fn default_download_timeout_secs() -> u64     { 120 }
fn default_api_timeout_secs()      -> u64     { 30 }
fn default_min_valid_bytes()       -> u64     { 5_000 }
fn default_detail_batch_size()     -> usize   { 50 }
fn default_concurrency()           -> usize   { 1 }
fn default_report_top_n()          -> usize   { 20 }

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            contact_email: default_contact_email(),
            tool_name: default_tool_name(),
            ncbi_api_key: None,
            papers_per_category: default_papers_per_category(),
            overshoot_margin: default_overshoot_margin(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            download_timeout_secs: default_download_timeout_secs(),
            api_timeout_secs: default_api_timeout_secs(),
            min_valid_bytes: default_min_valid_bytes(),
            detail_batch_size: default_detail_batch_size(),
            download_concurrency: default_concurrency(),
            search_concurrency: default_concurrency(),
            report_top_n: default_report_top_n(),
        }
    }
}

impl HarvestSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{} (mailto:{})", self.tool_name, env!("CARGO_PKG_VERSION"), self.contact_email)
    }
}

/// Requests per second allowed against each external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_ncbi_rps")]
    pub ncbi_rps: u32,
    #[serde(default = "default_rps")]
    pub europepmc_rps: u32,
    #[serde(default = "default_rps")]
    pub unpaywall_rps: u32,
    /// Publisher hosts reached through open-access locations.
    #[serde(default = "default_other_rps")]
    pub other_rps: u32,
}

fn default_ncbi_rps()  -> u32 { 3 }
fn default_rps()       -> u32 { 3 }
fn default_other_rps() -> u32 { 2 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ncbi_rps: default_ncbi_rps(),
            europepmc_rps: default_rps(),
            unpaywall_rps: default_rps(),
            other_rps: default_other_rps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_eutils_base")]
    pub eutils_base: String,
    #[serde(default = "default_idconv_url")]
    pub idconv_url: String,
    #[serde(default = "default_pmc_articles_base")]
    pub pmc_articles_base: String,
    #[serde(default = "default_europepmc_articles_base")]
    pub europepmc_articles_base: String,
    #[serde(default = "default_unpaywall_base")]
    pub unpaywall_base: String,
}

fn default_eutils_base()             -> String { "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string() }
fn default_idconv_url()              -> String { "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/".to_string() }
fn default_pmc_articles_base()       -> String { "https://www.ncbi.nlm.nih.gov/pmc/articles".to_string() }
fn default_europepmc_articles_base() -> String { "https://europepmc.org/articles".to_string() }
fn default_unpaywall_base()          -> String { "https://api.unpaywall.org/v2".to_string() }

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            eutils_base: default_eutils_base(),
            idconv_url: default_idconv_url(),
            pmc_articles_base: default_pmc_articles_base(),
            europepmc_articles_base: default_europepmc_articles_base(),
            unpaywall_base: default_unpaywall_base(),
        }
    }
}

impl EndpointConfig {
    /// Every service rooted under one base URL, as served by a mock server.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            eutils_base: format!("{base}/entrez/eutils"),
            idconv_url: format!("{base}/idconv/v1.0/"),
            pmc_articles_base: format!("{base}/pmc/articles"),
            europepmc_articles_base: format!("{base}/europepmc/articles"),
            unpaywall_base: format!("{base}/unpaywall/v2"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Extra or corrected venue impact factors, keyed by lower-case venue name.
    #[serde(default)]
    pub impact_factors: BTreeMap<String, f64>,
}


impl HarvestConfig {
    /// Load configuration from pubharvest.toml.
    /// Checks PUBHARVEST_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PUBHARVEST_CONFIG")
            .unwrap_or_else(|_| "pubharvest.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("PUBHARVEST_BASE_DIR") {
            config.harvest.base_dir = PathBuf::from(dir);
        }
        if let Ok(email) = std::env::var("PUBHARVEST_EMAIL") {
            config.harvest.contact_email = email;
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HarvestError::Config(e.to_string()))
    }

    /// Settings for tests: every endpoint on `mock_base`, no backoff, high rate limits.
    pub fn for_testing(mock_base: &str, base_dir: &Path) -> Self {
        Self {
            harvest: HarvestSettings {
                base_dir: base_dir.to_path_buf(),
                retry_backoff_ms: 0,
                download_timeout_secs: 5,
                api_timeout_secs: 5,
                ..HarvestSettings::default()
            },
            rate_limits: RateLimitConfig {
                ncbi_rps: 1_000,
                europepmc_rps: 1_000,
                unpaywall_rps: 1_000,
                other_rps: 1_000,
            },
            endpoints: EndpointConfig::rooted_at(mock_base),
            grading: GradingConfig::default(),
            categories: Vec::new(),
        }
    }

    /// Reject settings no run could make progress with.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(HarvestError::Config("no categories defined".into()));
        }
        let mut seen = HashSet::new();
        for cat in &self.categories {
            if cat.key.trim().is_empty() {
                return Err(HarvestError::Config("category with empty key".into()));
            }
            if cat.key.contains(['/', '\\']) || cat.key == "." || cat.key == ".." {
                return Err(HarvestError::Config(format!(
                    "category key '{}' is not a valid directory name",
                    cat.key
                )));
            }
            if !seen.insert(cat.key.as_str()) {
                return Err(HarvestError::Config(format!("duplicate category key '{}'", cat.key)));
            }
            if cat.search_terms.iter().all(|t| t.trim().is_empty()) {
                return Err(HarvestError::Config(format!(
                    "category '{}' has no search terms",
                    cat.key
                )));
            }
            if cat.target_or(self.harvest.papers_per_category) == 0 {
                return Err(HarvestError::Config(format!("category '{}' has a zero target", cat.key)));
            }
        }
        if self.harvest.detail_batch_size == 0 {
            return Err(HarvestError::Config("detail_batch_size must be > 0".into()));
        }
        let limits = &self.rate_limits;
        if [limits.ncbi_rps, limits.europepmc_rps, limits.unpaywall_rps, limits.other_rps]
            .contains(&0)
        {
            return Err(HarvestError::Config("rate limits must be > 0".into()));
        }
        Ok(())
    }
}
