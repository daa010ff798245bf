//! Borrow Anomaly Detection Library
//!
//! Scores equipment borrow requests for anomalousness with a per-feature
//! ensemble of detectors fitted on historical borrow patterns.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod history;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use consumer::BatchConsumer;
pub use error::{DetectionError, Result};
pub use feature_extractor::{Feature, FeatureExtractor, FeatureVector};
pub use models::{DetectorEnsemble, ScoringEngine};
pub use producer::ResultProducer;
pub use types::{result::AnomalyResult, transaction::BorrowTransaction};
