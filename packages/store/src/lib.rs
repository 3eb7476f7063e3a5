#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only access to the ETL pipeline's materializations.
//!
//! The upstream pipeline writes Parquet files (station features with
//! amenity counts, cleaned hourly traffic) and static JSON (cluster
//! personas, cluster centroid profiles). This crate reads them into the
//! canonical [`StationFeatures`] population the metrics engine consumes.
//! Every Parquet read opens a fresh in-memory `DuckDB` connection, which
//! keeps reads thread-safe and avoids file locks across concurrent
//! snapshot refreshes.
//!
//! A missing required file (the station features) fails the read so the
//! caller keeps serving its previous snapshot. Missing optional files
//! (traffic, personas, profiles) degrade to fallbacks with a logged
//! warning.

use metro_pulse_station_models::{
    HOURS_PER_WEEK, StationFeatures, TimeDna, normalize_station_key,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Station features with amenity counts and cluster assignments.
pub const CLUSTERS_FILE: &str = "clusters.parquet";

/// Cleaned hourly ridership observations.
pub const TRAFFIC_FILE: &str = "traffic_clean.parquet";

/// Cluster centroid curves, one 168-point profile per cluster.
pub const PROFILES_FILE: &str = "cluster_profiles.json";

/// Cluster personas generated by the upstream AI asset.
pub const PERSONAS_FILE: &str = "personas.json";

/// Scaled value assigned to every point of a flat cluster profile.
pub const CLUSTER_FLAT_SCALE: f64 = 20.0;

/// Errors that can occur while reading materializations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` query failed.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// File read failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Static JSON failed to parse.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required materialization is absent.
    #[error("Missing data file: {}", path.display())]
    MissingFile {
        /// The absent path.
        path: PathBuf,
    },
}

/// A cluster-level rider persona from the upstream AI asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Short catchy title.
    pub name: String,
    /// Two-sentence backstory.
    pub description: String,
    /// Freeform tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Aggregated row for the clusters overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Cluster identifier.
    pub cluster_id: i32,
    /// Stations assigned to the cluster.
    pub station_count: u64,
    /// Mean nearby bar count across the cluster.
    pub avg_bars: f64,
    /// A representative station name.
    pub example_station: String,
}

/// Shape of one entry in `cluster_profiles.json`.
#[derive(Deserialize)]
struct ClusterProfileRow {
    cluster_id: i64,
    hourly_profile: Vec<f64>,
}

/// Loads the full station feature population.
///
/// Reads the required features Parquet, joins per-station pulse curves
/// aggregated from the traffic Parquet, and falls back to the station's
/// cluster centroid profile (or a flat default) when no traffic was
/// observed for it.
///
/// # Errors
///
/// Returns [`StoreError`] if the features file is missing or a query
/// fails. Missing traffic or profile files are not errors.
pub fn load_station_features(data_dir: &Path) -> Result<Vec<StationFeatures>, StoreError> {
    let clusters_path = data_dir.join(CLUSTERS_FILE);
    if !clusters_path.exists() {
        return Err(StoreError::MissingFile {
            path: clusters_path,
        });
    }

    let pulses = match load_pulse_curves(&data_dir.join(TRAFFIC_FILE)) {
        Ok(pulses) => pulses,
        Err(e) => {
            log::warn!("Traffic pulses unavailable, falling back to cluster profiles: {e}");
            HashMap::new()
        }
    };
    let profiles = load_cluster_profiles(data_dir).unwrap_or_else(|e| {
        log::warn!("Cluster profiles unavailable: {e}");
        HashMap::new()
    });

    let conn = duckdb::Connection::open_in_memory()?;
    let sql = format!(
        r#"SELECT
            STATION,
            CAST(cluster_id AS INTEGER) AS cluster_id,
            "GTFS Latitude" AS lat,
            "GTFS Longitude" AS lon,
            CAST(COALESCE(n_bars, 0) AS INTEGER) AS n_bars,
            CAST(COALESCE(n_offices, 0) AS INTEGER) AS n_offices,
            CAST(COALESCE(n_universities, 0) AS INTEGER) AS n_universities
        FROM '{}'"#,
        clusters_path.display()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, i32>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, i32>(6)?,
        ))
    })?;

    let mut features = Vec::new();
    for row in rows {
        let (station, cluster_id, lat, lon, n_bars, n_offices, n_universities) = row?;
        let time_dna = pulses.get(&normalize_station_key(&station)).map_or_else(
            || fallback_time_dna(profiles.get(&cluster_id.to_string())),
            |hours| TimeDna::from_raw(hours.clone()),
        );
        features.push(StationFeatures {
            station,
            lat,
            lon,
            time_dna,
            n_bars: clamp_count(n_bars),
            n_offices: clamp_count(n_offices),
            n_universities: clamp_count(n_universities),
            cluster_id,
        });
    }

    log::info!("Loaded {} station feature records", features.len());
    Ok(features)
}

/// Negative amenity counts in upstream data are treated as zero.
fn clamp_count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Builds a fallback weekly curve for a station with no observed traffic.
///
/// Prefers the station's cluster centroid profile; a station in no known
/// cluster gets a flat [`CLUSTER_FLAT_SCALE`] curve, mirroring the
/// reference materialization's default.
fn fallback_time_dna(profile: Option<&Vec<f64>>) -> TimeDna {
    match profile {
        Some(scaled) if scaled.len() >= HOURS_PER_WEEK => {
            TimeDna::from_raw(scaled[..HOURS_PER_WEEK].to_vec())
        }
        _ => TimeDna::from_raw(vec![CLUSTER_FLAT_SCALE; HOURS_PER_WEEK]),
    }
}

/// Aggregates the traffic Parquet into per-station hour-of-week curves.
///
/// Keys are normalized station names; each value is a 168-point vector
/// of average entries, zero-filled for unobserved hours. Hour-of-week 0
/// is Monday 00:00.
fn load_pulse_curves(traffic_path: &Path) -> Result<HashMap<String, Vec<f64>>, StoreError> {
    if !traffic_path.exists() {
        return Err(StoreError::MissingFile {
            path: traffic_path.to_path_buf(),
        });
    }

    let conn = duckdb::Connection::open_in_memory()?;
    let sql = format!(
        "SELECT
            STATION,
            (CAST(isodow(dt) AS INTEGER) - 1) * 24 + CAST(hour(dt) AS INTEGER) AS hour_of_week,
            AVG(entries) AS vol
        FROM '{}'
        GROUP BY 1, 2",
        traffic_path.display()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, Option<f64>>(2)?,
        ))
    })?;

    let mut curves: HashMap<String, Vec<f64>> = HashMap::new();
    for row in rows {
        let (station, hour_of_week, vol) = row?;
        let vol = vol.filter(|v| v.is_finite()).unwrap_or(0.0);
        let curve = curves
            .entry(normalize_station_key(&station))
            .or_insert_with(|| vec![0.0; HOURS_PER_WEEK]);
        if let Ok(hour) = usize::try_from(hour_of_week) {
            if hour < HOURS_PER_WEEK {
                curve[hour] = vol;
            }
        }
    }

    log::info!("Loaded pulse curves for {} stations", curves.len());
    Ok(curves)
}

/// Loads cluster personas, keyed by cluster ID string.
///
/// An absent file yields an empty map: personas are decoration, not
/// required data.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be read or
/// parsed.
pub fn load_personas(data_dir: &Path) -> Result<HashMap<String, Persona>, StoreError> {
    let path = data_dir.join(PERSONAS_FILE);
    if !path.exists() {
        log::warn!("No personas file at {}", path.display());
        return Ok(HashMap::new());
    }
    let json = std::fs::read_to_string(path)?;
    parse_personas(&json)
}

/// Parses the personas JSON document.
///
/// # Errors
///
/// Returns [`StoreError::Json`] on malformed input.
pub fn parse_personas(json: &str) -> Result<HashMap<String, Persona>, StoreError> {
    Ok(serde_json::from_str(json)?)
}

/// Loads cluster centroid profiles scaled to 0-100, keyed by cluster ID
/// string.
///
/// # Errors
///
/// Returns [`StoreError`] if the file is missing, unreadable, or
/// malformed.
pub fn load_cluster_profiles(data_dir: &Path) -> Result<HashMap<String, Vec<f64>>, StoreError> {
    let path = data_dir.join(PROFILES_FILE);
    if !path.exists() {
        return Err(StoreError::MissingFile { path });
    }
    let json = std::fs::read_to_string(path)?;
    parse_cluster_profiles(&json)
}

/// Parses and scales the cluster profiles JSON document.
///
/// Centroid curves come out of the clustering step z-scored (values can
/// be negative); min-max scaling to 0-100 makes them chartable and
/// usable as fallback time DNA. Flat curves scale to
/// [`CLUSTER_FLAT_SCALE`].
///
/// # Errors
///
/// Returns [`StoreError::Json`] on malformed input.
pub fn parse_cluster_profiles(json: &str) -> Result<HashMap<String, Vec<f64>>, StoreError> {
    let rows: Vec<ClusterProfileRow> = serde_json::from_str(json)?;
    Ok(rows
        .into_iter()
        .map(|row| (row.cluster_id.to_string(), scale_profile(&row.hourly_profile)))
        .collect())
}

/// Min-max scales an arbitrary-length profile into 0-100.
fn scale_profile(profile: &[f64]) -> Vec<f64> {
    let min = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let max = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range > 0.0 {
        profile.iter().map(|v| (v - min) / range * 100.0).collect()
    } else {
        vec![CLUSTER_FLAT_SCALE; profile.len()]
    }
}

/// Aggregates per-cluster summary rows for the clusters overview.
///
/// # Errors
///
/// Returns [`StoreError`] if the features file is missing or the query
/// fails.
pub fn cluster_summaries(data_dir: &Path) -> Result<Vec<ClusterSummary>, StoreError> {
    let clusters_path = data_dir.join(CLUSTERS_FILE);
    if !clusters_path.exists() {
        return Err(StoreError::MissingFile {
            path: clusters_path,
        });
    }

    let conn = duckdb::Connection::open_in_memory()?;
    let sql = format!(
        "SELECT
            CAST(cluster_id AS INTEGER) AS cluster_id,
            COUNT(*) AS station_count,
            AVG(COALESCE(n_bars, 0)) AS avg_bars,
            FIRST(STATION) AS example_station
        FROM '{}'
        GROUP BY cluster_id
        ORDER BY cluster_id",
        clusters_path.display()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(ClusterSummary {
            cluster_id: row.get(0)?,
            station_count: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
            avg_bars: row.get(2)?,
            example_station: row.get(3)?,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_personas_document() {
        let json = r#"{
            "0": { "name": "The Night Owls", "description": "Late night activity.", "tags": ["Nightlife"] },
            "1": { "name": "The Commuters", "description": "9-5 riders.", "tags": [] }
        }"#;
        let personas = parse_personas(json).unwrap();
        assert_eq!(personas.len(), 2);
        assert_eq!(personas["0"].name, "The Night Owls");
    }

    #[test]
    fn persona_tags_default_to_empty() {
        let json = r#"{ "2": { "name": "The Students", "description": "Near campus." } }"#;
        let personas = parse_personas(json).unwrap();
        assert!(personas["2"].tags.is_empty());
    }

    #[test]
    fn rejects_malformed_personas() {
        assert!(matches!(
            parse_personas("[1, 2, 3]"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn scales_zscored_profiles_to_0_100() {
        let json = r#"[ { "cluster_id": 0, "hourly_profile": [-1.0, 0.0, 1.0] } ]"#;
        let profiles = parse_cluster_profiles(json).unwrap();
        assert_eq!(profiles["0"], vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn flat_profile_scales_to_default() {
        let json = r#"[ { "cluster_id": 3, "hourly_profile": [0.5, 0.5] } ]"#;
        let profiles = parse_cluster_profiles(json).unwrap();
        assert_eq!(profiles["3"], vec![CLUSTER_FLAT_SCALE, CLUSTER_FLAT_SCALE]);
    }

    #[test]
    fn fallback_dna_prefers_cluster_profile() {
        let profile = vec![42.0; HOURS_PER_WEEK];
        let dna = fallback_time_dna(Some(&profile));
        assert!((dna.hours()[0] - 42.0).abs() < f64::EPSILON);
        assert_eq!(dna.hours().len(), HOURS_PER_WEEK);
    }

    #[test]
    fn fallback_dna_without_profile_is_flat() {
        let dna = fallback_time_dna(None);
        assert!(dna
            .hours()
            .iter()
            .all(|&v| (v - CLUSTER_FLAT_SCALE).abs() < f64::EPSILON));
    }

    #[test]
    fn short_profile_falls_back_to_flat() {
        let short = vec![1.0; 24];
        let dna = fallback_time_dna(Some(&short));
        assert!((dna.hours()[0] - CLUSTER_FLAT_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_features_file_is_an_error() {
        let err = load_station_features(Path::new("/nonexistent/metro-pulse")).unwrap_err();
        assert!(matches!(err, StoreError::MissingFile { .. }));
    }

    #[test]
    fn missing_personas_file_is_empty_not_fatal() {
        let personas = load_personas(Path::new("/nonexistent/metro-pulse")).unwrap();
        assert!(personas.is_empty());
    }

    #[test]
    fn clamps_negative_counts() {
        assert_eq!(clamp_count(-3), 0);
        assert_eq!(clamp_count(7), 7);
    }
}
