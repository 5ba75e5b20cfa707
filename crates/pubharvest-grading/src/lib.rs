//! pubharvest-grading — Evidence classification and quality scoring for literature records.

pub mod classifier;
pub mod sample_size;
pub mod tables;

pub use classifier::{Classification, ClassifierInput, EvidenceClassifier, ScoreComponents};
pub use sample_size::extract_sample_size;
pub use tables::{EvidenceLevel, Grade, ImpactTable, StudyType};
