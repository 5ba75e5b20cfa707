//! pubharvest-ingestion — Literature acquisition for pubharvest.
//!
//! Sources: PubMed E-utilities for search and metadata; PMC, Europe PMC
//! and Unpaywall for full text. Each category is reconciled against disk,
//! topped up to its target, graded and persisted.

pub mod dedup;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod reconcile;
pub mod retrieval;
pub mod sources;
pub mod store;

pub use dedup::{Claim, Registry};
pub use models::{CategoryStats, DownloadStatus, PaperRecord, RunSummary};
pub use pipeline::{CategoryOutcome, CategoryPipeline, Harvester, PipelineState};
pub use reconcile::{reconcile, Reconciled};
pub use retrieval::{Downloader, FetchStrategy, RetrievalEngine};
pub use sources::CitationIndex;
pub use store::{LoadedCategory, OnDiskDocument, StateStore};
