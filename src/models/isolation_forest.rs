//! Isolation Forest for single-column data
//!
//! Anomalies are easier to isolate and thus have shorter path lengths in
//! randomly split trees. Scores follow the usual convention: `score_samples`
//! lies in [-1, 0] (lower = more anomalous) and the decision function is
//! shifted so that the `contamination` fraction of the training sample falls
//! below zero.

use super::stats;
use crate::error::{DetectionError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fewest samples a forest can be fitted on
pub const MIN_SAMPLES: usize = 2;

/// Upper bound on the per-tree subsample
const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fitting parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Expected anomalous fraction of the fitting sample, in (0, 0.5]
    pub contamination: f64,
    /// Seed for subsampling and split selection
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            contamination: 0.1,
            seed: 42,
        }
    }
}

impl IsolationForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(DetectionError::InvalidDetectorConfig {
                feature: String::new(),
                reason: "n_estimators must be at least 1".to_string(),
            });
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(DetectionError::InvalidDetectorConfig {
                feature: String::new(),
                reason: format!("contamination {} outside (0, 0.5]", self.contamination),
            });
        }
        Ok(())
    }

    /// Fit a forest on a column. Identical inputs and parameters give an
    /// identical forest.
    pub fn fit(&self, column: &[f64]) -> Result<IsolationForest> {
        self.validate()?;
        if column.len() < MIN_SAMPLES {
            return Err(DetectionError::InsufficientData {
                feature: String::new(),
                required: MIN_SAMPLES,
                actual: column.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let max_samples = column.len().min(MAX_SAMPLES);
        let max_depth = (max_samples as f64).log2().ceil() as usize;

        let trees = (0..self.n_estimators)
            .map(|_| {
                // Subsample without replacement
                let sample: Vec<f64> = rand::seq::index::sample(&mut rng, column.len(), max_samples)
                    .iter()
                    .map(|i| column[i])
                    .collect();
                IsolationTree::build(sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            max_samples,
            contamination: self.contamination,
            offset: 0.0,
        };

        let training_scores = forest.score_samples(column);
        forest.offset = stats::percentile(&training_scores, 100.0 * self.contamination)
            .unwrap_or(-0.5);

        Ok(forest)
    }
}

/// Fitted isolation forest. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    max_samples: usize,
    contamination: f64,
    /// Training-score percentile that separates normal from anomalous
    offset: f64,
}

impl IsolationForest {
    /// Expected path length of an unsuccessful BST search among `n` points (c(n))
    pub fn average_path_length(n: usize) -> f64 {
        match n {
            0 | 1 => 0.0,
            2 => 1.0,
            _ => {
                let n = n as f64;
                2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
            }
        }
    }

    /// Raw anomaly scores in [-1, 0]; lower = more anomalous
    pub fn score_samples(&self, values: &[f64]) -> Vec<f64> {
        let normalizer = Self::average_path_length(self.max_samples);
        values
            .iter()
            .map(|&value| {
                let total: f64 = self.trees.iter().map(|tree| tree.path_length(value)).sum();
                let mean_path = total / self.trees.len() as f64;
                -(2.0_f64).powf(-mean_path / normalizer)
            })
            .collect()
    }

    /// Scores shifted by the contamination offset; negative = anomalous
    pub fn decision_function(&self, values: &[f64]) -> Vec<f64> {
        self.score_samples(values)
            .into_iter()
            .map(|score| score - self.offset)
            .collect()
    }

    /// True for values the model considers anomalous
    pub fn predict(&self, values: &[f64]) -> Vec<bool> {
        self.decision_function(values)
            .into_iter()
            .map(|decision| decision < 0.0)
            .collect()
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

/// A single isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    root: IsolationNode,
}

/// Node in an isolation tree. Every node records the span of the samples
/// that reached it.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        split: f64,
        min: f64,
        max: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
        min: f64,
        max: f64,
    },
}

fn in_span(value: f64, min: f64, max: f64) -> bool {
    value >= min && value <= max
}

impl IsolationTree {
    fn build<R: Rng>(samples: Vec<f64>, max_depth: usize, rng: &mut R) -> Self {
        Self {
            root: Self::build_node(samples, 0, max_depth, rng),
        }
    }

    fn build_node<R: Rng>(
        samples: Vec<f64>,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> IsolationNode {
        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        // Terminal: depth limit, nothing left to split, or all values equal
        if depth >= max_depth
            || samples.len() <= 1
            || !min.is_finite()
            || !max.is_finite()
            || max <= min
        {
            return IsolationNode::Leaf {
                size: samples.len(),
                min,
                max,
            };
        }

        let split = rng.gen_range(min..max);
        let (left, right): (Vec<f64>, Vec<f64>) = samples.into_iter().partition(|&v| v <= split);

        IsolationNode::Internal {
            split,
            min,
            max,
            left: Box::new(Self::build_node(left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(right, depth + 1, max_depth, rng)),
        }
    }

    /// Path length for a value. A value outside the span seen at a node is
    /// isolated by that node.
    fn path_length(&self, value: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;

        loop {
            match node {
                IsolationNode::Leaf { size, min, max } => {
                    let expected = IsolationForest::average_path_length(*size);
                    return if in_span(value, *min, *max) {
                        depth + expected
                    } else {
                        depth + expected.min(1.0)
                    };
                }
                IsolationNode::Internal {
                    split,
                    min,
                    max,
                    left,
                    right,
                } => {
                    if !in_span(value, *min, *max) {
                        return depth + 1.0;
                    }
                    node = if value <= *split { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}
