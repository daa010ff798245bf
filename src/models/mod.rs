//! Anomaly detectors, the per-feature ensemble and batch scoring

pub mod aggregator;
pub mod detector;
pub mod ensemble;
pub mod inference;
pub mod isolation_forest;
pub mod scaler;
pub mod stats;

pub use aggregator::{ScoreAggregator, Verdict};
pub use detector::{ColumnDetector, DetectorConfig, DetectorOutput, Direction, FittedDetector};
pub use ensemble::{DetectorEnsemble, EnsembleConfig};
pub use inference::{ScoringEngine, ScoringInput};
