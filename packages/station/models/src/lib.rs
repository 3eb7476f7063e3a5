#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical per-station input types shared across the `MetroPulse` system.
//!
//! The ETL pipeline materializes one [`StationFeatures`] record per subway
//! station: a 168-hour weekly ridership curve (the "time DNA"), amenity
//! counts within walking distance, and an externally assigned cluster ID.
//! Everything downstream (metrics, narratives, the API) consumes these
//! types; nothing in this crate fetches or mutates data.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Hours in a week; the fixed length of a [`TimeDna`] vector.
pub const HOURS_PER_WEEK: usize = 168;

/// Hours in a day; the length of a folded daily profile.
pub const HOURS_PER_DAY: usize = 24;

/// Scaled value assigned to every hour of a flat but non-silent curve.
pub const FLAT_CURVE_SCALE: f64 = 50.0;

/// Scaled value assigned to every hour of an all-zero curve.
pub const SILENT_CURVE_SCALE: f64 = 5.0;

/// Regex matching everything that is not a letter or digit.
static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid regex"));

/// Normalizes a station name into a stable lookup key.
///
/// Strips all non-alphanumeric characters and lowercases, so
/// "Times Sq-42 St" and "TIMES SQ 42 ST" produce the same key. Applied
/// symmetrically wherever station names cross a join boundary.
#[must_use]
pub fn normalize_station_key(name: &str) -> String {
    NON_ALNUM_RE.replace_all(name, "").to_lowercase()
}

/// Errors produced when validating a raw time-DNA vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeDnaError {
    /// The vector does not contain exactly one value per hour of the week.
    #[error("time DNA has {len} values, expected {HOURS_PER_WEEK}")]
    WrongLength {
        /// Number of values actually present.
        len: usize,
    },

    /// A ridership value was negative or not finite.
    #[error("time DNA value at hour {hour} is invalid: {value}")]
    InvalidValue {
        /// Hour-of-week index of the offending value.
        hour: usize,
        /// The offending value.
        value: f64,
    },
}

/// A station's weekly ridership curve: one value per hour of the week.
///
/// Index 0 is Monday 00:00 and index 167 is Sunday 23:00. Values are
/// average hourly entries and must be non-negative. Construction does not
/// validate — ETL output can be malformed — so consumers that rank
/// stations call [`TimeDna::validate`] first and exclude failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDna(Vec<f64>);

impl TimeDna {
    /// Wraps a raw hour-of-week vector without validating it.
    #[must_use]
    pub const fn from_raw(hours: Vec<f64>) -> Self {
        Self(hours)
    }

    /// Checks the fixed-length and non-negativity invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TimeDnaError`] if the vector is not exactly 168 values
    /// or contains a negative or non-finite value.
    pub fn validate(&self) -> Result<(), TimeDnaError> {
        if self.0.len() != HOURS_PER_WEEK {
            return Err(TimeDnaError::WrongLength { len: self.0.len() });
        }
        for (hour, &value) in self.0.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(TimeDnaError::InvalidValue { hour, value });
            }
        }
        Ok(())
    }

    /// Returns the raw hour-of-week values.
    #[must_use]
    pub fn hours(&self) -> &[f64] {
        &self.0
    }

    /// Folds the weekly curve into a 24-hour average-day profile.
    ///
    /// Each hour-of-day value is the mean of that hour across the seven
    /// days of the week. Assumes a validated vector.
    #[must_use]
    pub fn daily_profile(&self) -> [f64; HOURS_PER_DAY] {
        let mut day = [0.0; HOURS_PER_DAY];
        for (i, &value) in self.0.iter().enumerate() {
            day[i % HOURS_PER_DAY] += value;
        }
        for value in &mut day {
            *value /= 7.0;
        }
        day
    }

    /// Folds and min-max scales the daily profile to 0-100.
    ///
    /// A flat non-zero curve scales to [`FLAT_CURVE_SCALE`] everywhere and
    /// an all-zero curve to [`SILENT_CURVE_SCALE`], matching the reference
    /// materialization so chart output stays comparable across stations.
    #[must_use]
    pub fn scaled_daily_profile(&self) -> [f64; HOURS_PER_DAY] {
        let day = self.daily_profile();
        scale_profile_to_100(&day)
    }

    /// Aggregates the scaled daily profile into the four canonical buckets.
    #[must_use]
    pub fn buckets(&self) -> TimeBuckets {
        TimeBuckets::from_daily_profile(&self.scaled_daily_profile())
    }
}

/// Min-max scales a daily profile into the 0-100 range.
///
/// Flat non-zero input maps every value to [`FLAT_CURVE_SCALE`]; all-zero
/// input maps to [`SILENT_CURVE_SCALE`].
#[must_use]
pub fn scale_profile_to_100(profile: &[f64; HOURS_PER_DAY]) -> [f64; HOURS_PER_DAY] {
    let min = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let max = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let mut scaled = [0.0; HOURS_PER_DAY];
    if range > 0.0 {
        for (out, &value) in scaled.iter_mut().zip(profile.iter()) {
            *out = (value - min) / range * 100.0;
        }
    } else if max > 0.0 {
        scaled = [FLAT_CURVE_SCALE; HOURS_PER_DAY];
    } else {
        scaled = [SILENT_CURVE_SCALE; HOURS_PER_DAY];
    }
    scaled
}

/// The four named periods of a station's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// 06:00-10:00.
    Morning,
    /// 11:00-14:00.
    Lunch,
    /// 16:00-20:00.
    Evening,
    /// 22:00-04:00, wrapping midnight.
    Night,
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Morning => write!(f, "morning"),
            Self::Lunch => write!(f, "lunch"),
            Self::Evening => write!(f, "evening"),
            Self::Night => write!(f, "night"),
        }
    }
}

/// Bucketed view of a station's scaled daily ridership profile.
///
/// Each field is the mean of the scaled curve over the bucket's hours.
/// The night bucket averages the late-evening (22-23) and early-morning
/// (0-3) segments separately and then averages the two, so a purely
/// late-evening spike and a purely pre-dawn spike weigh equally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBuckets {
    /// Mean scaled ridership 06:00-10:00.
    pub morning: f64,
    /// Mean scaled ridership 11:00-14:00.
    pub lunch: f64,
    /// Mean scaled ridership 16:00-20:00.
    pub evening: f64,
    /// Mean scaled ridership 22:00-04:00.
    pub night: f64,
}

impl TimeBuckets {
    /// Computes buckets from a 24-hour scaled profile.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_daily_profile(day: &[f64; HOURS_PER_DAY]) -> Self {
        let mean = |range: std::ops::Range<usize>| {
            let len = range.len();
            day[range].iter().sum::<f64>() / len as f64
        };
        Self {
            morning: mean(6..10),
            lunch: mean(11..14),
            evening: mean(16..20),
            night: (mean(22..24) + mean(0..4)) / 2.0,
        }
    }

    /// Returns the bucket with the highest value.
    ///
    /// Ties resolve in declaration order (morning, lunch, evening, night),
    /// so the result is deterministic for equal inputs.
    #[must_use]
    pub fn dominant(&self) -> TimeBucket {
        let mut best = (TimeBucket::Morning, self.morning);
        for (bucket, value) in [
            (TimeBucket::Lunch, self.lunch),
            (TimeBucket::Evening, self.evening),
            (TimeBucket::Night, self.night),
        ] {
            if value > best.1 {
                best = (bucket, value);
            }
        }
        best.0
    }
}

/// Immutable per-station input record, one per station in the population.
///
/// `cluster_id` is assigned by the upstream clustering step and is opaque
/// here. Coordinates are optional because upstream geocoding occasionally
/// fails; such stations classify to the unknown borough rather than being
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationFeatures {
    /// Station name; unique key within a population.
    pub station: String,
    /// GTFS latitude in degrees.
    pub lat: Option<f64>,
    /// GTFS longitude in degrees.
    pub lon: Option<f64>,
    /// Weekly ridership curve.
    pub time_dna: TimeDna,
    /// Bars, pubs, and nightclubs within walking distance.
    pub n_bars: u32,
    /// Offices within walking distance.
    pub n_offices: u32,
    /// Universities and colleges within walking distance.
    pub n_universities: u32,
    /// Externally assigned behavioral cluster.
    pub cluster_id: i32,
}

impl StationFeatures {
    /// Normalized lookup key for this station's name.
    #[must_use]
    pub fn key(&self) -> String {
        normalize_station_key(&self.station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dna_with_hour_of_day(hour: usize, value: f64) -> TimeDna {
        let mut hours = vec![0.0; HOURS_PER_WEEK];
        for day in 0..7 {
            hours[day * HOURS_PER_DAY + hour] = value;
        }
        TimeDna::from_raw(hours)
    }

    #[test]
    fn normalizes_station_names() {
        assert_eq!(normalize_station_key("Times Sq-42 St"), "timessq42st");
        assert_eq!(normalize_station_key("TIMES SQ 42 ST"), "timessq42st");
        assert_eq!(normalize_station_key(""), "");
    }

    #[test]
    fn validates_length() {
        let dna = TimeDna::from_raw(vec![0.0; 167]);
        assert_eq!(dna.validate(), Err(TimeDnaError::WrongLength { len: 167 }));
    }

    #[test]
    fn validates_values() {
        let mut hours = vec![0.0; HOURS_PER_WEEK];
        hours[5] = -1.0;
        let dna = TimeDna::from_raw(hours);
        assert!(matches!(
            dna.validate(),
            Err(TimeDnaError::InvalidValue { hour: 5, .. })
        ));
    }

    #[test]
    fn folds_weekly_curve_to_daily_mean() {
        let dna = dna_with_hour_of_day(8, 700.0);
        let day = dna.daily_profile();
        assert!((day[8] - 700.0).abs() < f64::EPSILON);
        assert!(day[9].abs() < f64::EPSILON);
    }

    #[test]
    fn scales_daily_profile_to_0_100() {
        let dna = dna_with_hour_of_day(8, 700.0);
        let scaled = dna.scaled_daily_profile();
        assert!((scaled[8] - 100.0).abs() < f64::EPSILON);
        assert!(scaled[0].abs() < f64::EPSILON);
    }

    #[test]
    fn flat_curve_scales_to_midpoint() {
        let dna = TimeDna::from_raw(vec![3.0; HOURS_PER_WEEK]);
        let scaled = dna.scaled_daily_profile();
        assert!(scaled.iter().all(|&v| (v - FLAT_CURVE_SCALE).abs() < f64::EPSILON));
    }

    #[test]
    fn silent_curve_scales_to_floor() {
        let dna = TimeDna::from_raw(vec![0.0; HOURS_PER_WEEK]);
        let scaled = dna.scaled_daily_profile();
        assert!(scaled.iter().all(|&v| (v - SILENT_CURVE_SCALE).abs() < f64::EPSILON));
    }

    #[test]
    fn night_bucket_spans_midnight() {
        // Spike at 23:00 and 02:00 only; night must dominate.
        let mut hours = vec![0.0; HOURS_PER_WEEK];
        for day in 0..7 {
            hours[day * HOURS_PER_DAY + 23] = 500.0;
            hours[day * HOURS_PER_DAY + 2] = 500.0;
        }
        let buckets = TimeDna::from_raw(hours).buckets();
        assert_eq!(buckets.dominant(), TimeBucket::Night);
        assert!(buckets.night > buckets.morning);
    }

    #[test]
    fn dominant_bucket_ties_resolve_in_declaration_order() {
        let buckets = TimeBuckets {
            morning: 40.0,
            lunch: 40.0,
            evening: 40.0,
            night: 40.0,
        };
        assert_eq!(buckets.dominant(), TimeBucket::Morning);
    }
}
