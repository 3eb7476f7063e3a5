//! Persistent narrative cache.
//!
//! Generated verdicts (especially AI-polished ones) are stable for a
//! given snapshot and expensive to recreate, so they are cached in
//! memory and mirrored to a JSON file that survives restarts. Loading a
//! missing or corrupt file yields an empty cache; persistence failures
//! are logged and otherwise ignored — the cache is an optimization,
//! never a source of truth.

use metro_pulse_narrative_models::NarrativeVerdict;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// File-backed cache of narrative verdicts keyed by station name.
pub struct NarrativeCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, NarrativeVerdict>>,
}

impl NarrativeCache {
    /// Opens the cache at `path`, loading any existing entries.
    #[must_use]
    pub fn load(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "Narrative cache at {} is corrupt, starting empty: {e}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Returns the cached verdict for a station, if any.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned.
    #[must_use]
    pub fn get(&self, station: &str) -> Option<NarrativeVerdict> {
        self.entries
            .lock()
            .expect("narrative cache mutex poisoned")
            .get(station)
            .cloned()
    }

    /// Inserts a verdict and mirrors the cache to disk (best effort).
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned.
    pub fn insert(&self, station: String, verdict: NarrativeVerdict) {
        let snapshot = {
            let mut entries = self
                .entries
                .lock()
                .expect("narrative cache mutex poisoned");
            entries.insert(station, verdict);
            entries.clone()
        };

        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    log::error!(
                        "Failed to persist narrative cache to {}: {e}",
                        self.path.display()
                    );
                }
            }
            Err(e) => log::error!("Failed to serialize narrative cache: {e}"),
        }
    }

    /// Drops every cached verdict, in memory and on disk (best effort).
    ///
    /// Called when a new snapshot is installed: verdicts embed
    /// population-relative scores, so they are stale the moment the
    /// population changes.
    ///
    /// # Panics
    ///
    /// Panics if the cache mutex is poisoned.
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("narrative cache mutex poisoned")
            .clear();
        if self.path.exists() {
            if let Err(e) = std::fs::write(&self.path, "{}") {
                log::error!(
                    "Failed to clear narrative cache at {}: {e}",
                    self.path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_pulse_narrative_models::Archetype;

    fn verdict(station: &str) -> NarrativeVerdict {
        NarrativeVerdict {
            station: station.to_string(),
            archetype: Archetype::BalancedMixedUse,
            persona: "Dynamic Brooklyn Hub".to_string(),
            base_narrative: "A balanced neighborhood.".to_string(),
            polished_narrative: None,
            is_ai_generated: false,
        }
    }

    fn temp_cache_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("metro-pulse-cache-test-{name}-{}.json", std::process::id()))
    }

    #[test]
    fn missing_file_loads_empty() {
        let cache = NarrativeCache::load(temp_cache_path("missing"));
        assert!(cache.get("anything").is_none());
    }

    #[test]
    fn insert_then_get_round_trips() {
        let path = temp_cache_path("roundtrip");
        let cache = NarrativeCache::load(path.clone());
        cache.insert("Bedford Av".to_string(), verdict("Bedford Av"));
        assert_eq!(
            cache.get("Bedford Av").unwrap().station,
            "Bedford Av"
        );

        // A fresh cache instance sees the persisted entry.
        let reloaded = NarrativeCache::load(path.clone());
        assert!(reloaded.get("Bedford Av").is_some());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let path = temp_cache_path("corrupt");
        std::fs::write(&path, "not json at all").unwrap();
        let cache = NarrativeCache::load(path.clone());
        assert!(cache.get("anything").is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn clear_empties_cache() {
        let path = temp_cache_path("clear");
        let cache = NarrativeCache::load(path.clone());
        cache.insert("A".to_string(), verdict("A"));
        cache.clear();
        assert!(cache.get("A").is_none());
        let _ = std::fs::remove_file(path);
    }
}
