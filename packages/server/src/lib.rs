#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the `MetroPulse` station intelligence
//! platform.
//!
//! Serves the intelligence REST API (station metrics, narratives,
//! cluster summaries) and the static frontend build. The metrics
//! snapshot lives behind a read/write lock holding an `Arc`: readers
//! clone the `Arc` and work from a complete, internally consistent
//! snapshot while background refreshes compute the next one and install
//! it with a single swap. Boundary and archetype rulesets are loaded at
//! startup and are fatal if malformed — the process refuses to serve
//! with a broken ruleset.

mod cache;
mod handlers;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use metro_pulse_ai::providers::{LlmProvider, create_provider_from_env};
use metro_pulse_geography::BoundarySet;
use metro_pulse_metrics::compute_snapshot;
use metro_pulse_metrics_models::MetricsSnapshot;
use metro_pulse_narrative::ArchetypeRules;
use metro_pulse_store as store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub use cache::NarrativeCache;

/// File name of the persistent narrative cache inside the data dir.
const NARRATIVES_FILE: &str = "narratives.json";

/// Shared application state.
pub struct AppState {
    /// Directory holding the ETL materializations.
    pub data_dir: PathBuf,
    /// Validated borough boundary ruleset.
    pub boundaries: BoundarySet,
    /// Validated archetype threshold ruleset.
    pub archetype_rules: ArchetypeRules,
    /// Cluster personas keyed by cluster ID string.
    pub personas: HashMap<String, store::Persona>,
    /// Scaled cluster centroid profiles keyed by cluster ID string.
    pub cluster_profiles: HashMap<String, Vec<f64>>,
    /// Optional generative polish provider; `None` serves
    /// deterministic-only narratives.
    pub provider: Option<Box<dyn LlmProvider>>,
    /// Persistent narrative verdict cache.
    pub narrative_cache: NarrativeCache,
    /// Current metrics snapshot; swapped atomically on refresh.
    pub snapshot: RwLock<Arc<MetricsSnapshot>>,
}

impl AppState {
    /// Clones the current snapshot handle.
    ///
    /// # Panics
    ///
    /// Panics if the snapshot lock is poisoned.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<MetricsSnapshot> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// Installs a freshly computed snapshot and invalidates the
    /// narrative cache (verdicts embed population-relative scores).
    ///
    /// # Panics
    ///
    /// Panics if the snapshot lock is poisoned.
    pub fn install_snapshot(&self, snapshot: MetricsSnapshot) {
        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
        self.narrative_cache.clear();
    }
}

/// Starts the `MetroPulse` API server.
///
/// Loads and validates the boundary and archetype rulesets (fatal on
/// failure), reads the station population from the store, computes the
/// initial metrics snapshot, and starts the HTTP server. Missing data
/// files are not fatal: the server starts with an empty snapshot and
/// fills it on the first refresh.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if a ruleset is malformed. A broken ruleset must refuse to
/// serve.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let data_dir = PathBuf::from(
        std::env::var("DATA_DIR").unwrap_or_else(|_| "data/processed".to_string()),
    );

    log::info!("Loading rulesets...");
    let boundaries = BoundarySet::from_env().expect("Failed to load boundary ruleset");
    let archetype_rules = ArchetypeRules::from_env().expect("Failed to load archetype ruleset");

    log::info!("Loading static cluster data...");
    let personas = store::load_personas(&data_dir).unwrap_or_else(|e| {
        log::error!("Failed to load personas: {e}");
        HashMap::new()
    });
    let cluster_profiles = store::load_cluster_profiles(&data_dir).unwrap_or_else(|e| {
        log::warn!("Failed to load cluster profiles: {e}");
        HashMap::new()
    });

    log::info!("Computing initial metrics snapshot...");
    let snapshot = match store::load_station_features(&data_dir) {
        Ok(population) => compute_snapshot(population, &boundaries),
        Err(e) => {
            log::error!("Station features unavailable, serving empty snapshot until refresh: {e}");
            MetricsSnapshot::empty()
        }
    };
    log::info!(
        "Snapshot {} ready with {} stations",
        snapshot.version,
        snapshot.len()
    );

    let provider = match create_provider_from_env() {
        Ok(provider) => Some(provider),
        Err(e) => {
            log::warn!("Narrative polish disabled: {e}");
            None
        }
    };

    let narrative_cache = NarrativeCache::load(data_dir.join(NARRATIVES_FILE));

    let state = web::Data::new(AppState {
        data_dir,
        boundaries,
        archetype_rules,
        personas,
        cluster_profiles,
        provider,
        narrative_cache,
        snapshot: RwLock::new(Arc::new(snapshot)),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route(
                        "/intelligence/stations",
                        web::get().to(handlers::stations),
                    )
                    .route(
                        "/intelligence/narrative/{station}",
                        web::get().to(handlers::narrative),
                    )
                    .route("/clusters", web::get().to(handlers::clusters))
                    .route("/snapshot/refresh", web::post().to(handlers::refresh)),
            )
            // Serve frontend static files (production)
            .service(Files::new("/", "app/dist").index_file("index.html"))
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
