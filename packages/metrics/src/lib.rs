#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The metrics engine: one batch pass over the full station population.
//!
//! Social Pulse and Office Score are percentile ranks, so they only make
//! sense computed across the whole population at once — there is no
//! per-station entry point. Each call produces a fresh immutable
//! [`MetricsSnapshot`]; callers swap snapshots atomically and never see a
//! partially scored population.
//!
//! Stations with malformed time DNA are excluded from the snapshot with
//! a logged warning; the batch itself never fails. An empty population
//! yields an empty snapshot.

use metro_pulse_geography::BoundarySet;
use metro_pulse_metrics_models::{MetricsSnapshot, StationIntelligence, StationMetrics};
use metro_pulse_station_models::StationFeatures;

/// Percentile assigned to every station of a singleton population.
///
/// Rank among one is undefined; the midpoint keeps downstream thresholds
/// (high/low cutoffs at 80/20) neutral instead of producing NaN.
pub const SINGLETON_PERCENTILE: f64 = 50.0;

/// Raw off-work energy signal before percentile ranking.
///
/// Bar density modulated by the late-night share of the ridership curve:
/// a station with no night traffic scores its plain bar count, a station
/// whose night bucket saturates doubles it. Monotone in both inputs.
/// The formula is locked by a regression test; changing it reshuffles
/// every Social Pulse in the population.
#[must_use]
pub fn raw_social_signal(n_bars: u32, night_bucket: f64) -> f64 {
    f64::from(n_bars) * (1.0 + night_bucket / 100.0)
}

/// Average-rank percentiles of `values`, scaled to 0-100.
///
/// For station *i*, the score is `100 * rank(values[i]) / (n - 1)`, so
/// the population minimum scores 0 and the maximum 100. Tied values
/// share the mean of the rank positions they span, which makes the
/// result independent of input order. A singleton population returns
/// [`SINGLETON_PERCENTILE`]; an empty one returns an empty vector.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![SINGLETON_PERCENTILE];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        // Find the end of the tie group starting at i.
        let mut j = i;
        while j + 1 < n && (values[order[j + 1]] - values[order[i]]).abs() < f64::EPSILON {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average_rank;
        }
        i = j + 1;
    }

    let denom = (n - 1) as f64;
    ranks.into_iter().map(|r| 100.0 * r / denom).collect()
}

/// Computes a full metrics snapshot for a station population.
///
/// The single batch operation of the engine:
///
/// 1. validate each station's time DNA, excluding failures with a
///    logged warning;
/// 2. classify each surviving station's borough once;
/// 3. percentile-rank the raw social signal and the office counts
///    across the population;
/// 4. derive the retail gap from the two normalized scores.
///
/// Input order of surviving stations is preserved in the snapshot.
#[must_use]
pub fn compute_snapshot(
    population: Vec<StationFeatures>,
    boundaries: &BoundarySet,
) -> MetricsSnapshot {
    let mut valid = Vec::with_capacity(population.len());
    for features in population {
        match features.time_dna.validate() {
            Ok(()) => valid.push(features),
            Err(e) => {
                log::warn!(
                    "Excluding station '{}' from metrics batch: {e}",
                    features.station
                );
            }
        }
    }

    let buckets: Vec<_> = valid.iter().map(|f| f.time_dna.buckets()).collect();

    let raw_social: Vec<f64> = valid
        .iter()
        .zip(&buckets)
        .map(|(f, b)| raw_social_signal(f.n_bars, b.night))
        .collect();
    let raw_office: Vec<f64> = valid.iter().map(|f| f64::from(f.n_offices)).collect();

    let social_pulse = percentile_ranks(&raw_social);
    let office_score = percentile_ranks(&raw_office);

    let stations = valid
        .into_iter()
        .zip(buckets)
        .zip(social_pulse.into_iter().zip(office_score))
        .map(|((features, time_buckets), (social, office))| {
            let borough = boundaries.classify_opt(features.lat, features.lon);
            StationIntelligence {
                station: features.station,
                lat: features.lat,
                lon: features.lon,
                cluster_id: features.cluster_id,
                n_bars: features.n_bars,
                n_offices: features.n_offices,
                n_universities: features.n_universities,
                time_buckets,
                metrics: StationMetrics {
                    social_pulse: social,
                    office_score: office,
                    retail_gap: office / 100.0 - social / 100.0,
                    borough,
                },
            }
        })
        .collect();

    MetricsSnapshot::new(stations)
}
