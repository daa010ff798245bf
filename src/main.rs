//! Borrow Anomaly Detection - Main Entry Point
//!
//! Fits the detector ensemble on borrow history, then answers batch scoring
//! requests over NATS and publishes an event for every flagged borrow.

use anyhow::{Context, Result};
use borrow_anomaly_detection::{
    config::{AppConfig, LoggingConfig},
    consumer::BatchConsumer,
    feature_extractor::FeatureExtractor,
    history,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{DetectorEnsemble, ScoringEngine},
    pipeline::{handle_payload, Reply},
    producer::ResultProducer,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("borrow_anomaly_detection={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Borrow Anomaly Detection");
    info!(
        features = config.detection.features.len(),
        score_floor = config.detection.score_floor,
        score_ceiling = config.detection.score_ceiling,
        "Configuration loaded successfully"
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new(config.detection.bounds()));

    let feature_extractor = Arc::new(FeatureExtractor::new());
    info!(
        "Feature extractor initialized ({} features)",
        feature_extractor.feature_count()
    );

    // Fit the ensemble before accepting any request
    let source = history::source_from_config(&config.history)?;
    let rows = source
        .load()
        .with_context(|| format!("Failed to load {} borrow history", source.name()))?;
    let ensemble = DetectorEnsemble::build(&rows, &config.detection)
        .context("Failed to build detector ensemble")?;
    let engine = ScoringEngine::new(Arc::new(ensemble));
    info!(
        source = source.name(),
        samples = rows.len(),
        detectors = engine.ensemble().len(),
        "Detector ensemble ready"
    );

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = BatchConsumer::from_config(client.clone(), &config.nats);
    let producer = ResultProducer::new(client.clone(), &config.nats.anomaly_subject);

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        request_subject = %consumer.subject(),
        queue_group = consumer.queue_group().unwrap_or("-"),
        anomaly_subject = %producer.anomaly_subject(),
        "Starting batch processing loop"
    );

    // Semaphore to limit concurrent batches
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let batch_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let feature_extractor = feature_extractor.clone();
        let engine = engine.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let batch_count = batch_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            // Scoring is CPU bound
            let reply = match tokio::task::spawn_blocking(move || {
                handle_payload(&feature_extractor, &engine, &message.payload)
            })
            .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = %e, "Scoring task failed");
                    metrics.record_failure(start_time.elapsed());
                    drop(permit);
                    return;
                }
            };
            let processing_time = start_time.elapsed();

            match &reply {
                Reply::Scored(response) => {
                    metrics.record_batch(
                        processing_time,
                        &response.results,
                        response.rejected.len(),
                    );
                    let anomalies = response.results.iter().filter(|r| r.is_anomaly).count();
                    debug!(
                        scored = response.results.len(),
                        rejected = response.rejected.len(),
                        anomalies,
                        processing_time_us = processing_time.as_micros(),
                        "Batch scored"
                    );
                }
                Reply::Failed(failure) => {
                    metrics.record_failure(processing_time);
                    warn!(
                        error = %failure.error,
                        retryable = failure.retryable,
                        "Batch could not be scored"
                    );
                }
            }

            match message.reply {
                Some(reply_subject) => {
                    if let Err(e) = producer.reply(reply_subject, &reply).await {
                        error!(error = %e, "Failed to send batch reply");
                    }
                }
                None => debug!("Batch request has no reply subject"),
            }

            if let Reply::Scored(response) = &reply {
                producer.publish_anomalies(&response.results).await;
            }

            let count = batch_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let processing_stats = metrics.get_processing_stats();
                info!(
                    batches = count,
                    throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                    avg_latency_us = processing_stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
