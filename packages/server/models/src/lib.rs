#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the `MetroPulse` server.
//!
//! These types are serialized to JSON for the REST API. They are
//! separate from the snapshot row types to allow independent evolution
//! of the API contract.

use chrono::{DateTime, Utc};
use metro_pulse_metrics_models::{StationIntelligence, StationMetrics};
use metro_pulse_station_models::TimeBuckets;
use metro_pulse_store::Persona;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `GET /api/health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A station intelligence row as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStation {
    /// Station name.
    pub station: String,
    /// GTFS latitude.
    pub lat: Option<f64>,
    /// GTFS longitude.
    pub lon: Option<f64>,
    /// Behavioral cluster.
    pub cluster_id: i32,
    /// Display name of the cluster's persona.
    pub persona_name: String,
    /// Bars, pubs, and nightclubs nearby.
    pub n_bars: u32,
    /// Offices nearby.
    pub n_offices: u32,
    /// Universities and colleges nearby.
    pub n_universities: u32,
    /// Bucketed daily ridership profile.
    pub time_dna: TimeBuckets,
    /// Derived population-relative scores.
    pub metrics: StationMetrics,
}

impl ApiStation {
    /// Builds an API row from a snapshot row and its persona name.
    #[must_use]
    pub fn from_intelligence(row: &StationIntelligence, persona_name: String) -> Self {
        Self {
            station: row.station.clone(),
            lat: row.lat,
            lon: row.lon,
            cluster_id: row.cluster_id,
            persona_name,
            n_bars: row.n_bars,
            n_offices: row.n_offices,
            n_universities: row.n_universities,
            time_dna: row.time_buckets,
            metrics: row.metrics,
        }
    }
}

/// `GET /api/intelligence/stations` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStationsResponse {
    /// Snapshot version token the rows belong to.
    pub version: Uuid,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
    /// All stations of the snapshot.
    pub stations: Vec<ApiStation>,
}

/// One cluster in the `GET /api/clusters` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiClusterSummary {
    /// Cluster identifier.
    pub cluster_id: i32,
    /// Stations in the cluster.
    pub station_count: u64,
    /// Mean nearby bar count.
    pub avg_bars: f64,
    /// Representative station.
    pub example_station: String,
    /// The cluster's rider persona.
    pub persona: Persona,
    /// 24-hour scaled chart profile.
    pub chart_data: Vec<f64>,
}

/// `POST /api/snapshot/refresh` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRefresh {
    /// Whether a background refresh was started.
    pub refreshing: bool,
    /// Version still being served while the refresh runs.
    pub previous_version: Uuid,
}
