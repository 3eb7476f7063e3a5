#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Borough classification from ordered linear decision boundaries.
//!
//! Assigns a [`Borough`] to a latitude/longitude pair in O(1) by walking
//! an ordered rule list; the first matching rule wins. The East River
//! diagonal is a slope-intercept line rather than a polygon edge, which
//! keeps the full-population reclassification the metrics engine does on
//! every snapshot refresh cheap. The ruleset is static configuration:
//! loaded once at startup, validated, never mutated.

use metro_pulse_geography_models::{Borough, BoundaryRule};
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Embedded default ruleset for the NYC subway system.
const NYC_RULES_TOML: &str = include_str!("../rules/nyc.toml");

/// Environment variable naming an override ruleset file.
pub const RULES_PATH_ENV: &str = "BOUNDARY_RULES_PATH";

/// Errors raised while loading or validating a boundary ruleset.
///
/// All of these are configuration errors: fatal at startup, never
/// produced during classification.
#[derive(Debug, Error)]
pub enum GeoConfigError {
    /// Ruleset file could not be read.
    #[error("Failed to read boundary ruleset: {0}")]
    Io(#[from] std::io::Error),

    /// Ruleset TOML failed to parse.
    #[error("Failed to parse boundary ruleset: {0}")]
    Parse(#[from] toml::de::Error),

    /// Ruleset parsed but violates a structural invariant.
    #[error("Invalid boundary ruleset: {message}")]
    Invalid {
        /// Description of the violated invariant.
        message: String,
    },
}

/// Top-level TOML document shape.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesDoc {
    rules: Vec<BoundaryRule>,
}

/// A validated, ordered boundary ruleset.
///
/// Construction validates; a constructed set classifies infallibly.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    rules: Vec<BoundaryRule>,
}

impl BoundarySet {
    /// Builds a set from rules, enforcing structural invariants:
    /// at least one rule, unique non-empty names, sane latitude ranges,
    /// and no rule shadowed by an earlier always-matching rule.
    ///
    /// # Errors
    ///
    /// Returns [`GeoConfigError::Invalid`] if any invariant is violated.
    pub fn from_rules(rules: Vec<BoundaryRule>) -> Result<Self, GeoConfigError> {
        if rules.is_empty() {
            return Err(GeoConfigError::Invalid {
                message: "ruleset contains no rules".to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for (idx, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(GeoConfigError::Invalid {
                    message: format!("rule at index {idx} has an empty name"),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(GeoConfigError::Invalid {
                    message: format!("duplicate rule name '{}'", rule.name),
                });
            }
            if let (Some(above), Some(at_most)) = (rule.when.lat_above, rule.when.lat_at_most) {
                if above >= at_most {
                    return Err(GeoConfigError::Invalid {
                        message: format!(
                            "rule '{}' has an empty latitude band ({above} .. {at_most})",
                            rule.name
                        ),
                    });
                }
            }
            // A catch-all makes every later rule unreachable.
            if rule.when.is_empty() && idx != rules.len() - 1 {
                return Err(GeoConfigError::Invalid {
                    message: format!(
                        "rule '{}' matches every point but is not last; later rules are unreachable",
                        rule.name
                    ),
                });
            }
        }

        Ok(Self { rules })
    }

    /// Parses and validates a ruleset from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`GeoConfigError`] on parse failure or invalid structure.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, GeoConfigError> {
        let doc: RulesDoc = toml::de::from_str(toml_str)?;
        Self::from_rules(doc.rules)
    }

    /// Loads and validates a ruleset from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GeoConfigError`] if the file cannot be read or is
    /// malformed.
    pub fn from_path(path: &Path) -> Result<Self, GeoConfigError> {
        let toml_str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml_str)
    }

    /// Loads the ruleset named by [`RULES_PATH_ENV`], or the embedded
    /// NYC default when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`GeoConfigError`] if an override file is configured but
    /// unreadable or malformed. A broken ruleset must refuse to serve.
    pub fn from_env() -> Result<Self, GeoConfigError> {
        match std::env::var(RULES_PATH_ENV) {
            Ok(path) => {
                log::info!("Loading boundary ruleset from {path}");
                Self::from_path(Path::new(&path))
            }
            Err(_) => Self::from_toml_str(NYC_RULES_TOML),
        }
    }

    /// The ordered rules of this set.
    #[must_use]
    pub fn rules(&self) -> &[BoundaryRule] {
        &self.rules
    }

    /// Classifies a point by walking the rules in order.
    ///
    /// Pure and total: identical inputs always yield the identical
    /// borough, and a point no rule claims returns [`Borough::Unknown`].
    #[must_use]
    pub fn classify(&self, lat: f64, lon: f64) -> Borough {
        self.rules
            .iter()
            .find(|rule| rule.when.matches(lat, lon))
            .map_or(Borough::Unknown, |rule| rule.borough)
    }

    /// Classifies a point whose coordinates may be missing.
    ///
    /// Stations with failed upstream geocoding get the unknown borough
    /// instead of being dropped.
    #[must_use]
    pub fn classify_opt(&self, lat: Option<f64>, lon: Option<f64>) -> Borough {
        match (lat, lon) {
            (Some(lat), Some(lon)) => self.classify(lat, lon),
            _ => Borough::Unknown,
        }
    }
}

static DEFAULT_SET: LazyLock<BoundarySet> = LazyLock::new(|| {
    BoundarySet::from_toml_str(NYC_RULES_TOML).expect("embedded NYC boundary ruleset is valid")
});

/// Returns the process-wide default (embedded NYC) ruleset.
///
/// # Panics
///
/// Panics if the embedded ruleset fails to parse. It is a compile-time
/// constant; the failure mode is a development error caught by tests.
#[must_use]
pub fn default_set() -> &'static BoundarySet {
    &DEFAULT_SET
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_pulse_geography_models::BoundaryCondition;

    #[test]
    fn embedded_ruleset_parses() {
        let set = default_set();
        assert!(!set.rules().is_empty());
    }

    #[test]
    fn classification_is_pure() {
        let set = default_set();
        let a = set.classify(40.7033, -73.9881);
        let b = set.classify(40.7033, -73.9881);
        assert_eq!(a, b);
    }

    #[test]
    fn dumbo_classifies_to_brooklyn_not_bounding_box_manhattan() {
        // West of parts of Manhattan by longitude alone; the East River
        // diagonal puts it in Brooklyn.
        assert_eq!(default_set().classify(40.7033, -73.9881), Borough::Brooklyn);
    }

    #[test]
    fn classifies_borough_samples() {
        let set = default_set();
        // Union Square
        assert_eq!(set.classify(40.7359, -73.9906), Borough::Manhattan);
        // Grand Central
        assert_eq!(set.classify(40.7527, -73.9772), Borough::Manhattan);
        // Yankee Stadium
        assert_eq!(set.classify(40.8500, -73.9258), Borough::Bronx);
        // St. George
        assert_eq!(set.classify(40.6437, -74.0736), Borough::StatenIsland);
        // Flushing Main St
        assert_eq!(set.classify(40.7596, -73.8300), Borough::Queens);
        // Coney Island
        assert_eq!(set.classify(40.5775, -73.9810), Borough::Brooklyn);
        // Court Square (LIC)
        assert_eq!(set.classify(40.7470, -73.9454), Borough::Queens);
        // Greenpoint
        assert_eq!(set.classify(40.7310, -73.9545), Borough::Brooklyn);
    }

    #[test]
    fn marble_hill_overrides_manhattan_cut() {
        assert_eq!(default_set().classify(40.8890, -73.9400), Borough::Bronx);
    }

    #[test]
    fn missing_coordinates_classify_unknown() {
        let set = default_set();
        assert_eq!(set.classify_opt(None, Some(-73.99)), Borough::Unknown);
        assert_eq!(set.classify_opt(Some(40.7), None), Borough::Unknown);
    }

    #[test]
    fn unmatched_point_returns_unknown() {
        // A set with a single narrow rule claims nothing else.
        let set = BoundarySet::from_rules(vec![BoundaryRule {
            name: "bronx-only".to_string(),
            borough: Borough::Bronx,
            when: BoundaryCondition {
                lat_above: Some(40.835),
                ..BoundaryCondition::default()
            },
        }])
        .unwrap();
        assert_eq!(set.classify(40.0, -74.0), Borough::Unknown);
    }

    #[test]
    fn non_overlapping_rule_order_is_irrelevant() {
        let bronx = BoundaryRule {
            name: "bronx".to_string(),
            borough: Borough::Bronx,
            when: BoundaryCondition {
                lat_above: Some(40.835),
                ..BoundaryCondition::default()
            },
        };
        let staten = BoundaryRule {
            name: "staten".to_string(),
            borough: Borough::StatenIsland,
            when: BoundaryCondition {
                lat_at_most: Some(40.65),
                lon_below: Some(-74.05),
                ..BoundaryCondition::default()
            },
        };

        let forward = BoundarySet::from_rules(vec![bronx.clone(), staten.clone()]).unwrap();
        let reversed = BoundarySet::from_rules(vec![staten, bronx]).unwrap();

        for (lat, lon) in [(40.85, -73.9), (40.64, -74.08), (40.7, -73.95)] {
            assert_eq!(forward.classify(lat, lon), reversed.classify(lat, lon));
        }
    }

    #[test]
    fn rejects_empty_ruleset() {
        assert!(matches!(
            BoundarySet::from_rules(vec![]),
            Err(GeoConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_shadowed_rules() {
        let rules = vec![
            BoundaryRule {
                name: "catch-all".to_string(),
                borough: Borough::Brooklyn,
                when: BoundaryCondition::default(),
            },
            BoundaryRule {
                name: "never-reached".to_string(),
                borough: Borough::Queens,
                when: BoundaryCondition {
                    lat_above: Some(40.7),
                    ..BoundaryCondition::default()
                },
            },
        ];
        assert!(matches!(
            BoundarySet::from_rules(rules),
            Err(GeoConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let rule = BoundaryRule {
            name: "dup".to_string(),
            borough: Borough::Bronx,
            when: BoundaryCondition {
                lat_above: Some(40.8),
                ..BoundaryCondition::default()
            },
        };
        assert!(matches!(
            BoundarySet::from_rules(vec![rule.clone(), rule]),
            Err(GeoConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            BoundarySet::from_toml_str("rules = 'not a table'"),
            Err(GeoConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_empty_latitude_band() {
        let rules = vec![BoundaryRule {
            name: "impossible".to_string(),
            borough: Borough::Bronx,
            when: BoundaryCondition {
                lat_above: Some(40.9),
                lat_at_most: Some(40.8),
                ..BoundaryCondition::default()
            },
        }];
        assert!(matches!(
            BoundarySet::from_rules(rules),
            Err(GeoConfigError::Invalid { .. })
        ));
    }
}
