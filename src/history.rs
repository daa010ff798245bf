//! Historical feature matrices used to fit the detector ensemble
//!
//! Where the history comes from is deployment policy: either a seeded
//! synthetic generator of typical borrow patterns, or a JSON file of past
//! borrow transactions.

use crate::config::{HistoryConfig, HistorySourceKind};
use crate::error::{DetectionError, Result};
use crate::feature_extractor::{FeatureExtractor, FeatureVector, USUAL_HOURS_END, USUAL_HOURS_START};
use crate::types::transaction::BorrowTransaction;
use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Supplies the rows the ensemble is fitted on
pub trait HistorySource: Send + Sync {
    fn load(&self) -> Result<Vec<FeatureVector>>;

    fn name(&self) -> &'static str;
}

/// Build the configured history source
pub fn source_from_config(config: &HistoryConfig) -> Result<Box<dyn HistorySource>> {
    match config.source {
        HistorySourceKind::Synthetic => {
            Ok(Box::new(SyntheticHistory::new(config.samples, config.seed)))
        }
        HistorySourceKind::File => {
            let path = config.path.as_deref().ok_or_else(|| {
                DetectionError::History("history.path is required for a file source".to_string())
            })?;
            Ok(Box::new(FileHistory::new(path)))
        }
    }
}

/// Seeded generator of typical borrow patterns.
///
/// Each sample is a short (1-5 h), medium (4-10 h) or full-day (6-14 h) borrow
/// of a handful of items, created during usual hours on any day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticHistory {
    samples: usize,
    seed: u64,
}

impl SyntheticHistory {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self { samples, seed }
    }

    fn sample<R: Rng>(rng: &mut R, monday: NaiveDate) -> Result<FeatureVector> {
        let (items, types, duration_hours): (u64, usize, f64) = match rng.gen_range(0..3) {
            0 => (rng.gen_range(1..=3), rng.gen_range(1..=2), rng.gen_range(1.0..5.0)),
            1 => (rng.gen_range(1..=4), rng.gen_range(1..=3), rng.gen_range(4.0..10.0)),
            _ => (rng.gen_range(1..=5), rng.gen_range(1..=3), rng.gen_range(6.0..14.0)),
        };
        // Cannot borrow more equipment types than items
        let types = types.min(items as usize);

        let hour = rng.gen_range(USUAL_HOURS_START..USUAL_HOURS_END);
        let day = rng.gen_range(0..7u64);

        let created_at = monday
            .checked_add_days(Days::new(day))
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .ok_or_else(|| {
                DetectionError::History(format!("invalid synthetic time day={day} hour={hour}"))
            })?;

        Ok(FeatureVector::from_parts(items, types, duration_hours, created_at))
    }
}

impl Default for SyntheticHistory {
    fn default() -> Self {
        Self::new(500, 42)
    }
}

impl HistorySource for SyntheticHistory {
    fn load(&self) -> Result<Vec<FeatureVector>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let monday = NaiveDate::from_ymd_opt(2025, 11, 10)
            .ok_or_else(|| DetectionError::History("invalid synthetic base date".to_string()))?;

        let rows = (0..self.samples)
            .map(|_| Self::sample(&mut rng, monday))
            .collect::<Result<Vec<_>>>()?;

        info!(samples = rows.len(), seed = self.seed, "Generated synthetic borrow history");
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// Past borrow transactions stored as a JSON array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl HistorySource for FileHistory {
    /// Extract every transaction in the file; unparseable records are skipped.
    fn load(&self) -> Result<Vec<FeatureVector>> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| DetectionError::History(format!("{}: {e}", self.path.display())))?;
        let transactions: Vec<BorrowTransaction> = serde_json::from_str(&raw)
            .map_err(|e| DetectionError::History(format!("{}: {e}", self.path.display())))?;

        let extractor = FeatureExtractor::new();
        let rows: Vec<FeatureVector> = transactions
            .iter()
            .filter_map(|tx| match extractor.extract(tx) {
                Ok(features) => Some(features),
                Err(e) => {
                    warn!(
                        borrow_request_id = %tx.borrow_request_id,
                        error = %e,
                        "Skipping historical transaction"
                    );
                    None
                }
            })
            .collect();

        if rows.is_empty() {
            return Err(DetectionError::InsufficientData {
                feature: "history".to_string(),
                required: 1,
                actual: 0,
            });
        }

        info!(
            path = %self.path.display(),
            transactions = transactions.len(),
            samples = rows.len(),
            "Loaded borrow history from file"
        );
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
