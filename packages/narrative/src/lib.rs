#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The deterministic narrative layer.
//!
//! Classifies a station into an [`Archetype`] by walking an ordered
//! threshold rule list (first match wins), then renders a persona title
//! and a two-sentence description from templates and the station's
//! concrete numbers. This layer never calls an external service and
//! always succeeds; it is the factual ground truth the optional
//! generative polish in `metro_pulse_ai` is constrained against.

use metro_pulse_metrics_models::StationIntelligence;
use metro_pulse_narrative_models::{
    Archetype, ArchetypeCondition, ArchetypeRule, NarrativeVerdict,
};
use metro_pulse_station_models::TimeBucket;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Embedded default archetype ruleset.
const ARCHETYPES_TOML: &str = include_str!("../rules/archetypes.toml");

/// Environment variable naming an override ruleset file.
pub const RULES_PATH_ENV: &str = "ARCHETYPE_RULES_PATH";

/// Errors raised while loading or validating an archetype ruleset.
///
/// Configuration errors are fatal at startup; classification itself is
/// infallible.
#[derive(Debug, Error)]
pub enum NarrativeConfigError {
    /// Ruleset file could not be read.
    #[error("Failed to read archetype ruleset: {0}")]
    Io(#[from] std::io::Error),

    /// Ruleset TOML failed to parse.
    #[error("Failed to parse archetype ruleset: {0}")]
    Parse(#[from] toml::de::Error),

    /// Ruleset parsed but violates a structural invariant.
    #[error("Invalid archetype ruleset: {message}")]
    Invalid {
        /// Description of the violated invariant.
        message: String,
    },
}

/// Top-level TOML document shape.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesDoc {
    rules: Vec<ArchetypeRule>,
}

/// A validated, ordered archetype ruleset.
///
/// The final rule is required to match everything, so classification is
/// total by construction.
#[derive(Debug, Clone)]
pub struct ArchetypeRules {
    rules: Vec<ArchetypeRule>,
}

impl ArchetypeRules {
    /// Builds a ruleset, enforcing structural invariants: at least one
    /// rule, unique non-empty names, a catch-all only in last position,
    /// and a last rule that is a catch-all.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeConfigError::Invalid`] if any invariant is
    /// violated.
    pub fn from_rules(rules: Vec<ArchetypeRule>) -> Result<Self, NarrativeConfigError> {
        if rules.is_empty() {
            return Err(NarrativeConfigError::Invalid {
                message: "ruleset contains no rules".to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for (idx, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(NarrativeConfigError::Invalid {
                    message: format!("rule at index {idx} has an empty name"),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(NarrativeConfigError::Invalid {
                    message: format!("duplicate rule name '{}'", rule.name),
                });
            }
            if rule.when.is_empty() && idx != rules.len() - 1 {
                return Err(NarrativeConfigError::Invalid {
                    message: format!(
                        "rule '{}' matches every station but is not last; later rules are unreachable",
                        rule.name
                    ),
                });
            }
        }

        let last = rules.last().expect("ruleset is non-empty");
        if !last.when.is_empty() {
            return Err(NarrativeConfigError::Invalid {
                message: format!(
                    "final rule '{}' must be an unconditional fallback so classification is total",
                    last.name
                ),
            });
        }

        Ok(Self { rules })
    }

    /// Parses and validates a ruleset from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeConfigError`] on parse failure or invalid
    /// structure.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, NarrativeConfigError> {
        let doc: RulesDoc = toml::de::from_str(toml_str)?;
        Self::from_rules(doc.rules)
    }

    /// Loads and validates a ruleset from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeConfigError`] if the file cannot be read or
    /// is malformed.
    pub fn from_path(path: &Path) -> Result<Self, NarrativeConfigError> {
        let toml_str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&toml_str)
    }

    /// Loads the ruleset named by [`RULES_PATH_ENV`], or the embedded
    /// default when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeConfigError`] if an override file is
    /// configured but unreadable or malformed.
    pub fn from_env() -> Result<Self, NarrativeConfigError> {
        match std::env::var(RULES_PATH_ENV) {
            Ok(path) => {
                log::info!("Loading archetype ruleset from {path}");
                Self::from_path(Path::new(&path))
            }
            Err(_) => Self::from_toml_str(ARCHETYPES_TOML),
        }
    }

    /// The ordered rules of this set.
    #[must_use]
    pub fn rules(&self) -> &[ArchetypeRule] {
        &self.rules
    }

    /// Assigns an archetype by walking the rules in order.
    #[must_use]
    pub fn archetype_for(&self, station: &StationIntelligence) -> Archetype {
        self.rules
            .iter()
            .find(|rule| condition_matches(&rule.when, station))
            .map_or(Archetype::BalancedMixedUse, |rule| rule.archetype)
    }
}

static DEFAULT_RULES: LazyLock<ArchetypeRules> = LazyLock::new(|| {
    ArchetypeRules::from_toml_str(ARCHETYPES_TOML).expect("embedded archetype ruleset is valid")
});

/// Returns the process-wide default (embedded) archetype ruleset.
///
/// # Panics
///
/// Panics if the embedded ruleset fails to parse. It is a compile-time
/// constant; the failure mode is a development error caught by tests.
#[must_use]
pub fn default_rules() -> &'static ArchetypeRules {
    &DEFAULT_RULES
}

/// Tests a station against every present threshold of a condition.
#[must_use]
pub fn condition_matches(cond: &ArchetypeCondition, station: &StationIntelligence) -> bool {
    let metrics = &station.metrics;
    if let Some(min) = cond.min_universities {
        if station.n_universities < min {
            return false;
        }
    }
    if let Some(v) = cond.social_pulse_above {
        if metrics.social_pulse <= v {
            return false;
        }
    }
    if let Some(v) = cond.social_pulse_below {
        if metrics.social_pulse >= v {
            return false;
        }
    }
    if let Some(v) = cond.office_score_above {
        if metrics.office_score <= v {
            return false;
        }
    }
    if let Some(v) = cond.office_score_below {
        if metrics.office_score >= v {
            return false;
        }
    }
    if let Some(v) = cond.retail_gap_above {
        if metrics.retail_gap <= v {
            return false;
        }
    }
    if let Some(v) = cond.retail_gap_below {
        if metrics.retail_gap >= v {
            return false;
        }
    }
    if let Some(bucket) = cond.dominant_bucket {
        if station.time_buckets.dominant() != bucket {
            return false;
        }
    }
    true
}

/// Classifies a station and renders its deterministic narrative.
///
/// Pure function of the station record and the ruleset: identical inputs
/// always produce the identical verdict, with `polished_narrative`
/// absent and `is_ai_generated` false.
#[must_use]
pub fn classify(station: &StationIntelligence, rules: &ArchetypeRules) -> NarrativeVerdict {
    let archetype = rules.archetype_for(station);
    let base_narrative = format!(
        "{} {}",
        vibe_sentence(archetype, station),
        time_sentence(station.time_buckets.dominant())
    );

    NarrativeVerdict {
        station: station.station.clone(),
        archetype,
        persona: persona_title(archetype, station),
        base_narrative,
        polished_narrative: None,
        is_ai_generated: false,
    }
}

/// Short display title for an archetype, templated with the borough.
fn persona_title(archetype: Archetype, station: &StationIntelligence) -> String {
    let borough = station.metrics.borough;
    match archetype {
        Archetype::AcademicQuarter => format!("{borough} Student Hub"),
        Archetype::NightlifeHub => format!("{borough} Nightlife District"),
        Archetype::RetailOpportunity => format!("{borough} Retail Frontier"),
        Archetype::SaturatedMarket => format!("Saturated {borough} Hotspot"),
        Archetype::CommuterCorridor => "Major Transit Anchor".to_string(),
        Archetype::ResidentialQuietZone => "Local Neighborhood Stop".to_string(),
        Archetype::BalancedMixedUse => format!("Dynamic {borough} Hub"),
    }
}

/// First narrative sentence: the station's character, with its numbers.
fn vibe_sentence(archetype: Archetype, station: &StationIntelligence) -> String {
    let metrics = &station.metrics;
    match archetype {
        Archetype::AcademicQuarter => {
            "Defined by student foot traffic and nearby educational institutions.".to_string()
        }
        Archetype::NightlifeHub => format!(
            "A high-energy area (Social Pulse: {:.0}%) bustling with evening social activity.",
            metrics.social_pulse
        ),
        Archetype::RetailOpportunity => format!(
            "A dense office corridor (Office Score: {:.0}/100) with few bars or restaurants to serve it, leaving room for new retail.",
            metrics.office_score
        ),
        Archetype::SaturatedMarket => format!(
            "A crowded social market (Social Pulse: {:.0}%) where new venues face established competition.",
            metrics.social_pulse
        ),
        Archetype::CommuterCorridor => {
            "A dense commercial district dominated by office buildings and professional services."
                .to_string()
        }
        Archetype::ResidentialQuietZone => {
            "A quieter, community-focused area serving local residents.".to_string()
        }
        Archetype::BalancedMixedUse => {
            "A balanced 'Live-Work-Play' neighborhood combining commercial density with social amenities."
                .to_string()
        }
    }
}

/// Second narrative sentence: the dominant period, with explicit hour
/// ranges for explainability.
const fn time_sentence(bucket: TimeBucket) -> &'static str {
    match bucket {
        TimeBucket::Morning => {
            "Passenger volume peaks in the Morning (6-10am), indicating a heavy outbound commuter flow."
        }
        TimeBucket::Lunch => {
            "Activity is highest midday (11am-2pm), driven by local lunch crowds."
        }
        TimeBucket::Evening => {
            "Passenger volume swells in the Evening (4-8pm) as the workday ends and retail activity picks up."
        }
        TimeBucket::Night => {
            "Unusually high Late Night (10pm-4am) ridership signals a destination for after-hours entertainment."
        }
    }
}
