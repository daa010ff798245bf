//! Test Borrow Request Producer
//!
//! Generates batches of borrow requests, sends them to the scoring service
//! over NATS request/reply and logs the verdicts.

use borrow_anomaly_detection::types::transaction::{Borrower, BorrowTransaction, Equipment};
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const EQUIPMENT: &[(&str, &str)] = &[
    ("Volleyball", "Mikasa"),
    ("Basketball", "Molten"),
    ("Badminton Racket", "Yonex"),
    ("Table Tennis Paddle", "Butterfly"),
    ("Football", "Adidas"),
    ("Projector", "Epson"),
    ("Extension Cord", "Omni"),
    ("Speaker", "JBL"),
    ("Microphone", "Shure"),
    ("Whiteboard", "Quartet"),
    ("Camera", "Canon"),
    ("Tripod", "Manfrotto"),
    ("Laptop", "Lenovo"),
    ("Chess Set", "Wegiel"),
    ("Frisbee", "Wham-O"),
    ("Jump Rope", "Everlast"),
    ("Yoga Mat", "Manduka"),
    ("Dumbbell", "Bowflex"),
    ("Cone Set", "Kwik Goal"),
    ("Net", "Tachikara"),
    ("Scoreboard", "Franklin"),
    ("Whistle", "Fox 40"),
];

const LOCATIONS: &[&str] = &["Gym", "Library", "Auditorium", "Field", "Room 204"];

const PURPOSES: &[&str] = &["Sports activity", "Class presentation", "Club meeting", "Practice"];

/// Ways a generated borrow request can be unusual
#[derive(Debug, Clone, Copy)]
enum Anomaly {
    UnusualHour,
    LongDuration,
    ManyItems,
}

/// Borrow request generator for testing
struct BorrowGenerator {
    rng: rand::rngs::ThreadRng,
}

impl BorrowGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn at_hour(&mut self, hour: i64) -> NaiveDateTime {
        let midnight = Utc::now().date_naive().and_time(chrono::NaiveTime::MIN);
        midnight + ChronoDuration::hours(hour) + ChronoDuration::minutes(self.rng.gen_range(0..60))
    }

    fn build(
        &mut self,
        created: NaiveDateTime,
        hours: i64,
        lines: usize,
        max_quantity: u32,
    ) -> BorrowTransaction {
        let id = Uuid::new_v4().to_string();
        let expected = created + ChronoDuration::hours(hours);

        let equipments = EQUIPMENT
            .choose_multiple(&mut self.rng, lines)
            .enumerate()
            .map(|(line, (name, brand))| Equipment {
                borrow_request_item_id: format!("{id}-{line}"),
                equipment_type_id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                brand: Some(brand.to_string()),
                model: None,
                image_url: None,
                quantity: self.rng.gen_range(1..=max_quantity),
            })
            .collect();

        BorrowTransaction {
            borrow_request_id: id,
            created_at: created.format(TIMESTAMP_FORMAT).to_string(),
            expected_return_at: expected.format(TIMESTAMP_FORMAT).to_string(),
            borrower: Borrower {
                id: Uuid::new_v4().to_string(),
                first_name: "Test".to_string(),
                middle_name: None,
                last_name: "Borrower".to_string(),
                avatar_url: None,
            },
            equipments,
            location: self.random_choice(LOCATIONS).to_string(),
            purpose: self.random_choice(PURPOSES).to_string(),
        }
    }

    /// Generate a typical daytime borrow of a few items
    fn generate_normal(&mut self) -> BorrowTransaction {
        let hour = self.rng.gen_range(8..17);
        let created = self.at_hour(hour);
        let hours = self.rng.gen_range(1..=8);
        let lines = self.rng.gen_range(1..=2);
        self.build(created, hours, lines, 2)
    }

    /// Generate a borrow that should be flagged
    fn generate_anomalous(&mut self) -> (Anomaly, BorrowTransaction) {
        let kind = *[Anomaly::UnusualHour, Anomaly::LongDuration, Anomaly::ManyItems]
            .choose(&mut self.rng)
            .unwrap_or(&Anomaly::UnusualHour);

        let tx = match kind {
            Anomaly::UnusualHour => {
                let hour = self.rng.gen_range(0..5);
                let created = self.at_hour(hour);
                self.build(created, 4, 1, 1)
            }
            Anomaly::LongDuration => {
                let hour = self.rng.gen_range(8..17);
                let created = self.at_hour(hour);
                let days = self.rng.gen_range(10..30);
                self.build(created, days * 24, 1, 1)
            }
            Anomaly::ManyItems => {
                let hour = self.rng.gen_range(9..16);
                let created = self.at_hour(hour);
                let lines = self.rng.gen_range(12..=EQUIPMENT.len());
                self.build(created, 4, lines, 3)
            }
        };
        (kind, tx)
    }

    fn generate_batch(&mut self, size: usize, anomaly_rate: f64) -> Vec<BorrowTransaction> {
        (0..size)
            .map(|_| {
                if self.rng.gen_bool(anomaly_rate) {
                    let (kind, tx) = self.generate_anomalous();
                    info!(
                        borrow_request_id = %tx.borrow_request_id,
                        kind = ?kind,
                        "Generated anomalous borrow"
                    );
                    tx
                } else {
                    self.generate_normal()
                }
            })
            .collect()
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn log_reply(payload: &[u8]) {
    let reply: Value = match serde_json::from_slice(payload) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Reply is not valid JSON");
            return;
        }
    };

    if let Some(error) = reply.get("error") {
        warn!(error = %error, retryable = %reply["retryable"], "Batch rejected by service");
        return;
    }

    for result in reply["results"].as_array().into_iter().flatten() {
        info!(
            borrow_request_id = %result["borrowRequestId"],
            score = %result["score"],
            is_anomaly = %result["isAnomaly"],
            triggered = %result.get("triggeredFeatures").unwrap_or(&serde_json::Value::Null),
            "Verdict"
        );
    }
    for rejected in reply["rejected"].as_array().into_iter().flatten() {
        warn!(
            borrow_request_id = %rejected["borrowRequestId"],
            reason = %rejected["reason"],
            "Transaction rejected"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Borrow Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("equipment.borrow.score");
    let batches: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(5);
    let anomaly_rate: f64 = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.2_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(500);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        batches,
        batch_size,
        anomaly_rate,
        delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(batches, batch_size, anomaly_rate, delay_ms).await;
        }
    };

    let mut generator = BorrowGenerator::new();

    for i in 0..batches {
        let batch = generator.generate_batch(batch_size, anomaly_rate);
        let payload = serde_json::to_vec(&batch)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => log_reply(&reply.payload),
            Err(e) => warn!(batch = i + 1, error = %e, "Request failed"),
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!("Completed! Sent {} batches of {} borrow requests", batches, batch_size);

    Ok(())
}

async fn run_dry_mode(
    batches: u64,
    batch_size: usize,
    anomaly_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = BorrowGenerator::new();

    for i in 0..batches {
        let batch = generator.generate_batch(batch_size, anomaly_rate);
        let json = serde_json::to_string_pretty(&batch)?;
        info!("Sample batch {}:\n{}", i + 1, json);

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
