//! HTTP handler functions for the `MetroPulse` API.

use actix_web::{HttpResponse, web};
use metro_pulse_metrics::compute_snapshot;
use metro_pulse_server_models::{
    ApiClusterSummary, ApiHealth, ApiRefresh, ApiStation, ApiStationsResponse,
};
use metro_pulse_store as store;

use crate::AppState;

/// Chart points served per cluster (one day of the weekly profile).
const CHART_HOURS: usize = 24;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/intelligence/stations`
///
/// Returns every station of the current snapshot with its derived
/// metrics, joined with cluster persona names. Readers always see one
/// complete snapshot: the handler clones the current `Arc` and works
/// from it even if a refresh swaps in a new one mid-request.
pub async fn stations(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.current_snapshot();

    let stations: Vec<ApiStation> = snapshot
        .stations
        .iter()
        .map(|row| {
            let persona_name = state
                .personas
                .get(&row.cluster_id.to_string())
                .map_or_else(|| "Unknown".to_string(), |p| p.name.clone());
            ApiStation::from_intelligence(row, persona_name)
        })
        .collect();

    HttpResponse::Ok().json(ApiStationsResponse {
        version: snapshot.version,
        computed_at: snapshot.computed_at,
        stations,
    })
}

/// `GET /api/intelligence/narrative/{station}`
///
/// Returns the narrative verdict for one station: cached if available,
/// otherwise the deterministic classification with optional generative
/// polish. A station missing from the snapshot gets a designated
/// unknown-station body, never an error, and narrative generation
/// failures never surface here — the deterministic layer always
/// produces a verdict.
pub async fn narrative(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let station = path.into_inner();

    if let Some(cached) = state.narrative_cache.get(&station) {
        return HttpResponse::Ok().json(cached);
    }

    let snapshot = state.current_snapshot();
    let Some(row) = snapshot.get(&station) else {
        return HttpResponse::Ok().json(serde_json::json!({
            "station": station,
            "persona": "Unknown Station",
            "baseNarrative": "Data unavailable.",
            "isAiGenerated": false,
        }));
    };

    let verdict = metro_pulse_narrative::classify(row, &state.archetype_rules);

    // The only network-bound step; bounded timeout, no lock held.
    let verdict = match &state.provider {
        Some(provider) => metro_pulse_ai::polish::polish(provider.as_ref(), &verdict, row).await,
        None => verdict,
    };

    state.narrative_cache.insert(station, verdict.clone());
    HttpResponse::Ok().json(verdict)
}

/// `GET /api/clusters`
///
/// Returns per-cluster summaries joined with personas and 24-hour chart
/// profiles.
pub async fn clusters(state: web::Data<AppState>) -> HttpResponse {
    let data_dir = state.data_dir.clone();
    let summaries = web::block(move || store::cluster_summaries(&data_dir)).await;

    match summaries {
        Ok(Ok(rows)) => {
            let response: Vec<ApiClusterSummary> = rows
                .into_iter()
                .map(|row| {
                    let cid = row.cluster_id.to_string();
                    let persona = state.personas.get(&cid).cloned().unwrap_or_else(|| {
                        store::Persona {
                            name: format!("Cluster {cid}"),
                            description: String::new(),
                            tags: Vec::new(),
                        }
                    });
                    let chart_data = state
                        .cluster_profiles
                        .get(&cid)
                        .map_or_else(|| vec![0.0; CHART_HOURS], |profile| {
                            profile.iter().copied().take(CHART_HOURS).collect()
                        });
                    ApiClusterSummary {
                        cluster_id: row.cluster_id,
                        station_count: row.station_count,
                        avg_bars: row.avg_bars,
                        example_station: row.example_station,
                        persona,
                        chart_data,
                    }
                })
                .collect();
            HttpResponse::Ok().json(response)
        }
        Ok(Err(e)) => {
            log::error!("Failed to query cluster summaries: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query clusters"
            }))
        }
        Err(e) => {
            log::error!("Cluster summary task failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query clusters"
            }))
        }
    }
}

/// `POST /api/snapshot/refresh`
///
/// Starts a background recomputation of the metrics snapshot from the
/// store. Responds immediately; in-flight reads keep being served from
/// the previous snapshot until the new one is installed in a single
/// atomic swap. A failed refresh leaves the previous snapshot in place.
pub async fn refresh(state: web::Data<AppState>) -> HttpResponse {
    let previous_version = state.current_snapshot().version;

    let task_state = state.clone();
    tokio::spawn(async move {
        let data_dir = task_state.data_dir.clone();
        let boundaries = task_state.boundaries.clone();

        let result = tokio::task::spawn_blocking(move || {
            let population = store::load_station_features(&data_dir)?;
            Ok::<_, store::StoreError>(compute_snapshot(population, &boundaries))
        })
        .await;

        match result {
            Ok(Ok(snapshot)) => {
                log::info!(
                    "Installing metrics snapshot {} ({} stations)",
                    snapshot.version,
                    snapshot.len()
                );
                task_state.install_snapshot(snapshot);
            }
            Ok(Err(e)) => {
                log::error!("Snapshot refresh failed, keeping previous snapshot: {e}");
            }
            Err(e) => {
                log::error!("Snapshot refresh task panicked: {e}");
            }
        }
    });

    HttpResponse::Accepted().json(ApiRefresh {
        refreshing: true,
        previous_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NarrativeCache;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use metro_pulse_geography::default_set;
    use metro_pulse_narrative::default_rules;
    use metro_pulse_station_models::{HOURS_PER_WEEK, StationFeatures, TimeDna};
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    fn features(station: &str, n_bars: u32, n_offices: u32, cluster_id: i32) -> StationFeatures {
        StationFeatures {
            station: station.to_string(),
            lat: Some(40.7172),
            lon: Some(-73.9566),
            time_dna: TimeDna::from_raw(vec![10.0; HOURS_PER_WEEK]),
            n_bars,
            n_offices,
            n_universities: 0,
            cluster_id,
        }
    }

    fn test_state(name: &str) -> web::Data<AppState> {
        let boundaries = default_set().clone();
        let snapshot = compute_snapshot(
            vec![
                features("Bedford Av", 40, 2, 0),
                features("Wall St", 1, 80, 1),
            ],
            &boundaries,
        );

        let mut personas = HashMap::new();
        personas.insert(
            "0".to_string(),
            store::Persona {
                name: "The Night Owls".to_string(),
                description: "Late night activity.".to_string(),
                tags: vec!["Nightlife".to_string()],
            },
        );

        let cache_path = std::env::temp_dir().join(format!(
            "metro-pulse-handler-test-{name}-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&cache_path);

        web::Data::new(AppState {
            data_dir: std::env::temp_dir().join("metro-pulse-no-such-data"),
            boundaries,
            archetype_rules: default_rules().clone(),
            personas,
            cluster_profiles: HashMap::new(),
            provider: None,
            narrative_cache: NarrativeCache::load(cache_path),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    async fn body_json(resp: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let resp = health().await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["healthy"], true);
    }

    #[actix_web::test]
    async fn stations_returns_full_snapshot_with_personas() {
        let state = test_state("stations");
        let resp = stations(state).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["stations"].as_array().unwrap().len(), 2);
        assert!(body["version"].is_string());

        let bedford = body["stations"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["station"] == "Bedford Av")
            .unwrap();
        assert_eq!(bedford["personaName"], "The Night Owls");
        assert_eq!(bedford["metrics"]["borough"], "Brooklyn");

        let wall = body["stations"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["station"] == "Wall St")
            .unwrap();
        // Cluster 1 has no persona configured.
        assert_eq!(wall["personaName"], "Unknown");
    }

    #[actix_web::test]
    async fn narrative_serves_deterministic_verdict_without_provider() {
        let state = test_state("narrative");
        let resp = narrative(state, web::Path::from("Wall St".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["isAiGenerated"], false);
        assert!(body["polishedNarrative"].is_null());
        assert!(!body["baseNarrative"].as_str().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn narrative_for_unknown_station_is_not_an_error() {
        let state = test_state("unknown");
        let resp = narrative(state, web::Path::from("Atlantis".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["persona"], "Unknown Station");
        assert_eq!(body["isAiGenerated"], false);
    }

    #[actix_web::test]
    async fn narrative_lookup_normalizes_station_names() {
        let state = test_state("normalized");
        let resp = narrative(state, web::Path::from("WALL-ST".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["station"], "Wall St");
    }

    #[actix_web::test]
    async fn refresh_responds_immediately_with_previous_version() {
        let state = test_state("refresh");
        let expected = state.current_snapshot().version.to_string();
        let resp = refresh(state).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body = body_json(resp).await;
        assert_eq!(body["refreshing"], true);
        assert_eq!(body["previousVersion"], expected.as_str());
    }
}
