//! Paced, timeout-aware HTTP access to the literature services.
//!
//! Every outbound request waits on the limiter for its [`Service`] before
//! it is sent. Only timeouts are retried; any other failure is returned
//! to the caller on the first attempt.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{HarvestSettings, RateLimitConfig};
use crate::error::{HarvestError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// External service a request is billed against.
/// All NCBI hosts (E-utilities, idconv, PMC pages) share one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Ncbi,
    EuropePmc,
    Unpaywall,
    Other,
}

/// One direct limiter per service, spacing requests at `1 / rps`.
pub struct RequestPacer {
    limiters: HashMap<Service, DirectLimiter>,
}

impl RequestPacer {
    pub fn new(limits: &RateLimitConfig) -> Self {
        let mut limiters = HashMap::new();
        for (service, rps) in [
            (Service::Ncbi, limits.ncbi_rps),
            (Service::EuropePmc, limits.europepmc_rps),
            (Service::Unpaywall, limits.unpaywall_rps),
            (Service::Other, limits.other_rps),
        ] {
            let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
            let quota = Quota::per_second(rps).allow_burst(NonZeroU32::MIN);
            limiters.insert(service, RateLimiter::direct(quota));
        }
        Self { limiters }
    }

    pub async fn until_ready(&self, service: Service) {
        if let Some(limiter) = self.limiters.get(&service) {
            limiter.until_ready().await;
        }
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: String,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone)]
pub struct HarvestClient {
    client: Client,
    pacer: Arc<RequestPacer>,
    max_attempts: u32,
    backoff: Duration,
    api_timeout: Duration,
    download_timeout: Duration,
}

impl HarvestClient {
    pub fn new(settings: &HarvestSettings, limits: &RateLimitConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(settings.user_agent())
            .build()?;

        Ok(Self {
            client,
            pacer: Arc::new(RequestPacer::new(limits)),
            max_attempts: settings.max_retries.max(1),
            backoff: settings.retry_backoff(),
            api_timeout: settings.api_timeout(),
            download_timeout: settings.download_timeout(),
        })
    }

    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    /// GET with the API timeout, failing on any non-success status.
    /// The returned [`Fetched::final_url`] reflects redirects.
    pub async fn get_page(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Fetched> {
        let fetched = self.fetch(service, url, query, self.api_timeout).await?;
        if !fetched.is_success() {
            return Err(HarvestError::Status {
                url: url.to_string(),
                status: fetched.status,
            });
        }
        Ok(fetched)
    }

    pub async fn get_text(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String> {
        Ok(self.get_page(service, url, query).await?.text())
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let text = self.get_text(service, url, query).await?;
        serde_json::from_str(&text)
            .map_err(|e| HarvestError::Parse(format!("{url}: invalid JSON: {e}")))
    }

    /// GET and read the whole body, retrying timeouts up to the configured
    /// attempt count with a fixed backoff. Status codes are left to the caller.
    pub async fn fetch(
        &self,
        service: Service,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Fetched> {
        let mut attempt = 1;
        loop {
            self.pacer.until_ready(service).await;
            match self.fetch_once(url, query, timeout).await {
                Ok(fetched) => {
                    debug!(url, status = fetched.status, bytes = fetched.body.len(), "fetched");
                    return Ok(fetched);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(url, attempt, max = self.max_attempts, "timed out, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Fetched> {
        let started = Instant::now();
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                HarvestError::TransientNetwork {
                    url: url.to_string(),
                    elapsed: started.elapsed(),
                }
            } else {
                HarvestError::Http(e)
            }
        };

        let resp = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = resp.url().to_string();
        let body = resp.bytes().await.map_err(classify)?.to_vec();

        Ok(Fetched { status, content_type, final_url, body })
    }
}
