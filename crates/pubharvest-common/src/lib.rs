//! pubharvest-common — Shared configuration, errors, categories and HTTP access.

pub mod categories;
pub mod config;
pub mod error;
pub mod http;

// Re-export commonly used types
pub use categories::{builtin_categories, DiseaseCategory};
pub use config::{EndpointConfig, GradingConfig, HarvestConfig, HarvestSettings, RateLimitConfig};
pub use error::{HarvestError, Result};
pub use http::{Fetched, HarvestClient, RequestPacer, Service};
