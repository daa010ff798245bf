//! Throughput, latency and verdict statistics for the scoring service.

use crate::feature_extractor::{Feature, FEATURE_COUNT};
use crate::models::detector::ScoreBounds;
use crate::types::result::AnomalyResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Equal-width buckets spanning the configured score bounds
const SCORE_BUCKETS: usize = 12;

/// Metrics collector for the scoring pipeline
pub struct PipelineMetrics {
    /// Batches handled, including failed ones
    pub batches_processed: AtomicU64,
    /// Transactions scored
    pub transactions_scored: AtomicU64,
    /// Transactions flagged anomalous
    pub anomalies_flagged: AtomicU64,
    /// Transactions rejected as malformed
    pub transactions_rejected: AtomicU64,
    /// Batches that failed as a whole
    pub batches_failed: AtomicU64,
    /// How often each feature triggered a verdict
    feature_triggers: [AtomicU64; FEATURE_COUNT],
    /// Batch processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Score distribution buckets
    score_buckets: RwLock<[u64; SCORE_BUCKETS]>,
    /// Range covered by the histogram; scores outside land in the end buckets
    score_bounds: ScoreBounds,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector with a histogram over `score_bounds`
    pub fn new(score_bounds: ScoreBounds) -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            transactions_scored: AtomicU64::new(0),
            anomalies_flagged: AtomicU64::new(0),
            transactions_rejected: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            feature_triggers: std::array::from_fn(|_| AtomicU64::new(0)),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; SCORE_BUCKETS]),
            score_bounds,
            start_time: Instant::now(),
        }
    }

    /// Record a scored batch
    pub fn record_batch(
        &self,
        processing_time: Duration,
        results: &[AnomalyResult],
        rejected: usize,
    ) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.transactions_scored
            .fetch_add(results.len() as u64, Ordering::Relaxed);
        self.transactions_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        if let Ok(mut buckets) = self.score_buckets.write() {
            for result in results {
                buckets[self.bucket(result.score)] += 1;
            }
        }

        for result in results.iter().filter(|r| r.is_anomaly) {
            self.anomalies_flagged.fetch_add(1, Ordering::Relaxed);
            for feature in &result.triggered_features {
                self.feature_triggers[feature.index()].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a batch that could not be scored
    pub fn record_failure(&self, processing_time: Duration) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);
    }

    fn record_processing_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    fn bucket_width(&self) -> f64 {
        (self.score_bounds.ceiling - self.score_bounds.floor) / SCORE_BUCKETS as f64
    }

    fn bucket(&self, score: f64) -> usize {
        let ScoreBounds { floor, ceiling } = self.score_bounds;
        if score.is_nan() || !(floor < ceiling) {
            return 0;
        }
        let clamped = score.clamp(floor, ceiling);
        (((clamped - floor) / self.bucket_width()) as usize).min(SCORE_BUCKETS - 1)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (transactions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; SCORE_BUCKETS] {
        self.score_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or([0; SCORE_BUCKETS])
    }

    /// How often each feature triggered an anomaly, in feature order
    pub fn get_feature_triggers(&self) -> Vec<(Feature, u64)> {
        Feature::ALL
            .iter()
            .map(|&feature| {
                (
                    feature,
                    self.feature_triggers[feature.index()].load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let tx_count = self.transactions_scored.load(Ordering::Relaxed);
        let anomaly_count = self.anomalies_flagged.load(Ordering::Relaxed);
        let anomaly_rate = if tx_count > 0 {
            (anomaly_count as f64 / tx_count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let score_dist = self.get_score_distribution();

        info!(
            batches = self.batches_processed.load(Ordering::Relaxed),
            failed_batches = self.batches_failed.load(Ordering::Relaxed),
            transactions = tx_count,
            rejected = self.transactions_rejected.load(Ordering::Relaxed),
            anomalies = anomaly_count,
            anomaly_rate = format!("{anomaly_rate:.1}%"),
            throughput = format!("{:.1} tx/s", self.get_throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Batch processing time"
        );

        for (feature, count) in self.get_feature_triggers() {
            if count > 0 {
                info!(feature = %feature, count, "Anomalies triggered by feature");
            }
        }

        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = (count as f64 / total as f64) * 100.0;
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            let width = self.bucket_width();
            let low = self.score_bounds.floor + i as f64 * width;
            info!(
                "score {:>4.1}..{:>4.1}: {:>6} ({:>5.1}%) {}",
                low,
                low + width,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(ScoreBounds::default())
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
