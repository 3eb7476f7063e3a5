#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Derived station metrics and population snapshot types.
//!
//! A [`MetricsSnapshot`] is an immutable, versioned batch of
//! [`StationIntelligence`] rows computed together, so the
//! population-relative percentile scores inside it are internally
//! consistent. Consumers hold a snapshot by `Arc` and swap whole
//! snapshots; rows are never updated in place.

use chrono::{DateTime, Utc};
use metro_pulse_geography_models::Borough;
use metro_pulse_station_models::{TimeBuckets, normalize_station_key};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Population-relative scores for a single station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMetrics {
    /// Percentile-ranked off-work energy, 0-100.
    ///
    /// Directly interpretable: 87 means the station out-pulses 87% of
    /// the population.
    pub social_pulse: f64,
    /// Percentile-ranked office density, 0-100.
    pub office_score: f64,
    /// `office_score/100 - social_pulse/100`, in [-1, 1].
    ///
    /// High values flag office-heavy areas underserved by social
    /// amenities; values near or below zero read as saturated or
    /// balanced markets.
    pub retail_gap: f64,
    /// Borough assigned by the boundary classifier, attached here so
    /// downstream consumers never reclassify.
    pub borough: Borough,
}

/// One station's full intelligence record inside a snapshot.
///
/// Joins the identifying input fields with the derived metrics and the
/// bucketed time DNA the narrative layer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationIntelligence {
    /// Station name (unique key within the population).
    pub station: String,
    /// GTFS latitude.
    pub lat: Option<f64>,
    /// GTFS longitude.
    pub lon: Option<f64>,
    /// Externally assigned behavioral cluster.
    pub cluster_id: i32,
    /// Bars, pubs, and nightclubs within walking distance.
    pub n_bars: u32,
    /// Offices within walking distance.
    pub n_offices: u32,
    /// Universities and colleges within walking distance.
    pub n_universities: u32,
    /// Bucketed view of the scaled daily ridership curve.
    pub time_buckets: TimeBuckets,
    /// Derived population-relative scores.
    pub metrics: StationMetrics,
}

/// An immutable, versioned batch of station intelligence.
///
/// The version token identifies the population materialization the
/// snapshot was computed from; two snapshots never share a token.
/// Serializable for inspection, deliberately not deserializable: the
/// lookup index is derived state and snapshots are only ever built by
/// [`MetricsSnapshot::new`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Unique token for this snapshot.
    pub version: Uuid,
    /// When the batch computation finished.
    pub computed_at: DateTime<Utc>,
    /// All stations of the population, input order preserved.
    pub stations: Vec<StationIntelligence>,
    /// Normalized-name lookup index into `stations`.
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MetricsSnapshot {
    /// Builds a snapshot from computed rows, stamping a fresh version
    /// token and indexing rows by normalized station key.
    #[must_use]
    pub fn new(stations: Vec<StationIntelligence>) -> Self {
        let index = stations
            .iter()
            .enumerate()
            .map(|(i, row)| (normalize_station_key(&row.station), i))
            .collect();
        Self {
            version: Uuid::new_v4(),
            computed_at: Utc::now(),
            stations,
            index,
        }
    }

    /// An empty snapshot, used before the first refresh completes.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Looks a station up by name (normalized internally).
    #[must_use]
    pub fn get(&self, station: &str) -> Option<&StationIntelligence> {
        self.index
            .get(&normalize_station_key(station))
            .map(|&i| &self.stations[i])
    }

    /// Number of stations in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether the snapshot holds no stations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> StationIntelligence {
        StationIntelligence {
            station: name.to_string(),
            lat: Some(40.7),
            lon: Some(-73.99),
            cluster_id: 0,
            n_bars: 1,
            n_offices: 1,
            n_universities: 0,
            time_buckets: TimeBuckets {
                morning: 10.0,
                lunch: 10.0,
                evening: 10.0,
                night: 10.0,
            },
            metrics: StationMetrics {
                social_pulse: 50.0,
                office_score: 50.0,
                retail_gap: 0.0,
                borough: Borough::Manhattan,
            },
        }
    }

    #[test]
    fn snapshot_lookup_normalizes_names() {
        let snapshot = MetricsSnapshot::new(vec![row("Times Sq-42 St")]);
        assert!(snapshot.get("TIMES SQ 42 ST").is_some());
        assert!(snapshot.get("nowhere").is_none());
    }

    #[test]
    fn snapshot_versions_are_unique() {
        let a = MetricsSnapshot::empty();
        let b = MetricsSnapshot::empty();
        assert_ne!(a.version, b.version);
    }
}
