//! Feature extraction for borrow anomaly scoring.
//!
//! Turns a borrow transaction into the fixed-order numeric vector that every
//! detector in the ensemble is fitted on and scored against.

use crate::error::{DetectionError, Result};
use crate::types::transaction::BorrowTransaction;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;

/// Number of features produced per transaction.
pub const FEATURE_COUNT: usize = 8;

/// Creation hours before this are unusual.
pub const USUAL_HOURS_START: u32 = 7;
/// Creation hours from this one on are unusual.
pub const USUAL_HOURS_END: u32 = 20;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offsets written without a colon (`+0800`), which RFC 3339 rejects
const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
];

/// Feature identity, in vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    NumItems,
    NumItemTypes,
    BorrowDurationHours,
    BorrowHourSin,
    BorrowHourCos,
    BorrowDaySin,
    BorrowDayCos,
    IsUnusualHour,
}

impl Feature {
    /// All features in vector order
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::NumItems,
        Feature::NumItemTypes,
        Feature::BorrowDurationHours,
        Feature::BorrowHourSin,
        Feature::BorrowHourCos,
        Feature::BorrowDaySin,
        Feature::BorrowDayCos,
        Feature::IsUnusualHour,
    ];

    /// Position of this feature in a feature vector
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::NumItems => "num_items",
            Feature::NumItemTypes => "num_item_types",
            Feature::BorrowDurationHours => "borrow_duration_hours",
            Feature::BorrowHourSin => "borrow_hour_sin",
            Feature::BorrowHourCos => "borrow_hour_cos",
            Feature::BorrowDaySin => "borrow_day_sin",
            Feature::BorrowDayCos => "borrow_day_cos",
            Feature::IsUnusualHour => "is_unusual_hour",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric summary of one borrow transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub num_items: f64,
    pub num_item_types: f64,
    pub borrow_duration_hours: f64,
    pub borrow_hour_sin: f64,
    pub borrow_hour_cos: f64,
    pub borrow_day_sin: f64,
    pub borrow_day_cos: f64,
    pub is_unusual_hour: f64,
}

impl FeatureVector {
    /// Derive the vector from already-aggregated counts and the naive creation time.
    ///
    /// Both the extractor and the synthetic history generator go through here so
    /// fitted and scored values are computed identically.
    pub fn from_parts(
        num_items: u64,
        num_item_types: usize,
        borrow_duration_hours: f64,
        created_at: NaiveDateTime,
    ) -> Self {
        let hour = created_at.hour();
        let day = created_at.weekday().num_days_from_monday();

        let (borrow_hour_sin, borrow_hour_cos) = cyclic_encode(f64::from(hour), 24.0);
        let (borrow_day_sin, borrow_day_cos) = cyclic_encode(f64::from(day), 7.0);

        Self {
            num_items: num_items as f64,
            num_item_types: num_item_types as f64,
            borrow_duration_hours,
            borrow_hour_sin,
            borrow_hour_cos,
            borrow_day_sin,
            borrow_day_cos,
            is_unusual_hour: if is_unusual_hour(hour) { 1.0 } else { 0.0 },
        }
    }

    /// Value of a single feature
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::NumItems => self.num_items,
            Feature::NumItemTypes => self.num_item_types,
            Feature::BorrowDurationHours => self.borrow_duration_hours,
            Feature::BorrowHourSin => self.borrow_hour_sin,
            Feature::BorrowHourCos => self.borrow_hour_cos,
            Feature::BorrowDaySin => self.borrow_day_sin,
            Feature::BorrowDayCos => self.borrow_day_cos,
            Feature::IsUnusualHour => self.is_unusual_hour,
        }
    }
}

/// Map a periodic value onto the unit circle so wrap-around values stay adjacent.
pub fn cyclic_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = TAU * (value / period);
    (angle.sin(), angle.cos())
}

/// Half-open usual window: 07:00 through 19:59 is usual.
pub fn is_unusual_hour(hour: u32) -> bool {
    hour < USUAL_HOURS_START || hour >= USUAL_HOURS_END
}

/// A parsed timestamp: its own wall-clock reading plus the offset, if one was given.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timestamp {
    local: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl Timestamp {
    fn parse(field: &'static str, value: &str) -> Result<Self> {
        let trimmed = value.trim();

        let with_offset = DateTime::parse_from_rfc3339(trimmed).ok().or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(trimmed, format).ok())
        });
        if let Some(dt) = with_offset {
            return Ok(Self {
                local: dt.naive_local(),
                offset: Some(*dt.offset()),
            });
        }

        for format in NAIVE_FORMATS {
            if let Ok(local) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self { local, offset: None });
            }
        }

        if let Some(local) = Self::parse_date_hour(trimmed) {
            return Ok(Self { local, offset: None });
        }

        Err(DetectionError::MalformedInput {
            field,
            value: value.to_string(),
        })
    }

    /// Date-only (`2025-11-13`, midnight) or date and hour (`2025-11-13T08`)
    fn parse_date_hour(value: &str) -> Option<NaiveDateTime> {
        let (date, hour) = match value.split_once(['T', ' ']) {
            Some((date, hour)) => {
                if hour.len() != 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                (date, hour.parse().ok()?)
            }
            None => (value, 0),
        };
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(hour, 0, 0)
    }

    /// Signed hours from `self` to `later`.
    ///
    /// Offsets are honoured only when both sides carry one; otherwise wall-clock
    /// readings are compared directly.
    fn hours_until(&self, later: &Timestamp) -> f64 {
        let delta = match (self.offset, later.offset) {
            (Some(from), Some(to)) => {
                (later.local - chrono::Duration::seconds(i64::from(to.local_minus_utc())))
                    - (self.local - chrono::Duration::seconds(i64::from(from.local_minus_utc())))
            }
            _ => later.local - self.local,
        };
        delta.num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Feature extractor that transforms borrow transactions into feature vectors.
///
/// Stateless; a single instance is shared across all request handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features from a transaction.
    ///
    /// Fails only when a timestamp cannot be parsed. Zero or negative durations
    /// and empty equipment lists are valid inputs.
    pub fn extract(&self, tx: &BorrowTransaction) -> Result<FeatureVector> {
        let created_at = Timestamp::parse("createdAt", &tx.created_at)?;
        let expected_return_at = Timestamp::parse("expectedReturnAt", &tx.expected_return_at)?;

        let num_items: u64 = tx.equipments.iter().map(|eq| u64::from(eq.quantity)).sum();

        Ok(FeatureVector::from_parts(
            num_items,
            tx.equipments.len(),
            created_at.hours_until(&expected_return_at),
            created_at.local,
        ))
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Feature names in vector order
    pub fn feature_names(&self) -> Vec<&'static str> {
        Feature::ALL.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_at(created_at: &str, expected_return_at: &str) -> BorrowTransaction {
        BorrowTransaction::new("test-001", created_at, expected_return_at)
            .with_equipment("Volleyball", 1)
    }

    #[test]
    fn test_normal_daytime_features() {
        let extractor = FeatureExtractor::new();
        let tx = tx_at("2025-11-13T08:00:00", "2025-11-13T12:00:00");

        let features = extractor.extract(&tx).unwrap();

        assert_eq!(features.num_items, 1.0);
        assert_eq!(features.num_item_types, 1.0);
        assert!((features.borrow_duration_hours - 4.0).abs() < 1e-9);
        assert_eq!(features.is_unusual_hour, 0.0);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = FeatureExtractor::new();
        let tx = tx_at("2025-11-13T21:30:00", "2025-11-14T09:00:00");

        assert_eq!(extractor.extract(&tx).unwrap(), extractor.extract(&tx).unwrap());
    }

    #[test]
    fn test_cyclic_encoding_on_unit_circle() {
        let extractor = FeatureExtractor::new();
        for hour in 0..24 {
            let created = format!("2025-11-{:02}T{:02}:15:00", 10 + hour % 7, hour);
            let features = extractor.extract(&tx_at(&created, &created)).unwrap();

            let hour_norm = features.borrow_hour_sin.powi(2) + features.borrow_hour_cos.powi(2);
            let day_norm = features.borrow_day_sin.powi(2) + features.borrow_day_cos.powi(2);
            assert!((hour_norm - 1.0).abs() < 1e-9, "hour {hour}: {hour_norm}");
            assert!((day_norm - 1.0).abs() < 1e-9, "hour {hour}: {day_norm}");
        }
    }

    #[test]
    fn test_midnight_adjacent_to_late_evening() {
        let (sin_23, cos_23) = cyclic_encode(23.0, 24.0);
        let (sin_0, cos_0) = cyclic_encode(0.0, 24.0);
        let (sin_12, cos_12) = cyclic_encode(12.0, 24.0);

        let near = ((sin_23 - sin_0).powi(2) + (cos_23 - cos_0).powi(2)).sqrt();
        let far = ((sin_12 - sin_0).powi(2) + (cos_12 - cos_0).powi(2)).sqrt();
        assert!(near < 0.3);
        assert!((far - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unusual_hour_boundaries() {
        let extractor = FeatureExtractor::new();
        let cases = [(6, 1.0), (7, 0.0), (19, 0.0), (20, 1.0), (0, 1.0), (23, 1.0)];

        for (hour, expected) in cases {
            let created = format!("2025-11-13T{hour:02}:00:00");
            let features = extractor.extract(&tx_at(&created, &created)).unwrap();
            assert_eq!(features.is_unusual_hour, expected, "hour {hour}");
        }
    }

    #[test]
    fn test_day_of_week_starts_monday() {
        // 2025-11-10 is a Monday
        let extractor = FeatureExtractor::new();
        let features = extractor
            .extract(&tx_at("2025-11-10T10:00:00", "2025-11-10T11:00:00"))
            .unwrap();

        assert!(features.borrow_day_sin.abs() < 1e-12);
        assert!((features.borrow_day_cos - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantities_summed_across_lines() {
        let extractor = FeatureExtractor::new();
        let tx = BorrowTransaction::new("tx", "2025-11-13T08:00:00", "2025-11-13T10:00:00")
            .with_equipment("Ball", 3)
            .with_equipment("Net", 2)
            .with_equipment("Pump", 1);

        let features = extractor.extract(&tx).unwrap();

        assert_eq!(features.num_items, 6.0);
        assert_eq!(features.num_item_types, 3.0);
    }

    #[test]
    fn test_empty_equipment_is_not_an_error() {
        let extractor = FeatureExtractor::new();
        let tx = BorrowTransaction::new("tx", "2025-11-13T08:00:00", "2025-11-13T10:00:00");

        let features = extractor.extract(&tx).unwrap();

        assert_eq!(features.num_items, 0.0);
        assert_eq!(features.num_item_types, 0.0);
    }

    #[test]
    fn test_negative_duration_is_kept() {
        let extractor = FeatureExtractor::new();
        let features = extractor
            .extract(&tx_at("2025-11-13T12:00:00", "2025-11-13T09:30:00"))
            .unwrap();

        assert!((features.borrow_duration_hours + 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_offset_timestamps_use_wall_clock_hour() {
        let extractor = FeatureExtractor::new();
        let features = extractor
            .extract(&tx_at("2025-11-13T04:00:00+08:00", "2025-11-13T12:00:00+08:00"))
            .unwrap();

        assert_eq!(features.is_unusual_hour, 1.0);
        assert!((features.borrow_duration_hours - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_difference_honoured() {
        let extractor = FeatureExtractor::new();
        let features = extractor
            .extract(&tx_at("2025-11-13T08:00:00+08:00", "2025-11-13T08:00:00Z"))
            .unwrap();

        assert!((features.borrow_duration_hours - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_compact_offset_and_hour_only_timestamps() {
        let extractor = FeatureExtractor::new();

        let features = extractor
            .extract(&tx_at("2025-11-13T08:00:00+0800", "2025-11-13T12:00:00+0800"))
            .unwrap();
        assert_eq!(features.is_unusual_hour, 0.0);
        assert!((features.borrow_duration_hours - 4.0).abs() < 1e-9);

        let features = extractor
            .extract(&tx_at("2025-11-13T04", "2025-11-13T12"))
            .unwrap();
        assert_eq!(features.is_unusual_hour, 1.0);
        assert!((features.borrow_duration_hours - 8.0).abs() < 1e-9);

        let features = extractor
            .extract(&tx_at("2025-11-13", "2025-11-14"))
            .unwrap();
        assert!((features.borrow_duration_hours - 24.0).abs() < 1e-9);

        assert!(extractor
            .extract(&tx_at("2025-11-13T8am", "2025-11-14"))
            .is_err());
    }

    #[test]
    fn test_malformed_timestamp() {
        let extractor = FeatureExtractor::new();
        let err = extractor
            .extract(&tx_at("not-a-date", "2025-11-13T12:00:00"))
            .unwrap_err();

        assert_eq!(
            err,
            DetectionError::MalformedInput {
                field: "createdAt",
                value: "not-a-date".to_string(),
            }
        );

        let err = extractor
            .extract(&tx_at("2025-11-13T08:00:00", "2025-13-45T12:00:00"))
            .unwrap_err();
        assert!(matches!(
            err,
            DetectionError::MalformedInput {
                field: "expectedReturnAt",
                ..
            }
        ));
    }

    #[test]
    fn test_feature_order() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 8);
        assert_eq!(extractor.feature_names()[2], "borrow_duration_hours");
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }

        let features = extractor
            .extract(&tx_at("2025-11-13T08:00:00", "2025-11-13T12:00:00"))
            .unwrap();
        assert_eq!(features.get(Feature::ALL[0]), features.num_items);
        assert_eq!(features.get(Feature::ALL[7]), features.is_unusual_hour);
    }
}
