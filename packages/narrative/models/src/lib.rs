#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Narrative archetypes, verdict types, and threshold rule definitions.
//!
//! The deterministic narrative layer classifies a station into one of a
//! fixed set of archetypes by walking an ordered threshold rule list —
//! the same first-match-wins discipline the boundary classifier uses.
//! These types model the rules and the resulting verdict; evaluation
//! lives in `metro_pulse_narrative`.

use metro_pulse_station_models::TimeBucket;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The fixed set of station narrative archetypes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Archetype {
    /// University-driven station with heavy student foot traffic.
    #[strum(serialize = "Academic Quarter")]
    #[serde(rename = "Academic Quarter")]
    AcademicQuarter,
    /// Top-percentile social energy concentrated after dark.
    #[strum(serialize = "Nightlife Hub")]
    #[serde(rename = "Nightlife Hub")]
    NightlifeHub,
    /// Office-heavy area underserved by social amenities.
    #[strum(serialize = "Retail Opportunity")]
    #[serde(rename = "Retail Opportunity")]
    RetailOpportunity,
    /// Amenity-dense area with little room for new venues.
    #[strum(serialize = "Saturated Market")]
    #[serde(rename = "Saturated Market")]
    SaturatedMarket,
    /// Workday-driven station moving commuter volume.
    #[strum(serialize = "Commuter Corridor")]
    #[serde(rename = "Commuter Corridor")]
    CommuterCorridor,
    /// Low-energy station serving local residents.
    #[strum(serialize = "Residential Quiet Zone")]
    #[serde(rename = "Residential Quiet Zone")]
    ResidentialQuietZone,
    /// Default: no single character dominates.
    #[strum(serialize = "Balanced Mixed-Use")]
    #[serde(rename = "Balanced Mixed-Use")]
    BalancedMixedUse,
}

/// Conjunction of thresholds a station must satisfy for a rule to match.
///
/// Every present field must hold. An entirely empty condition matches
/// every station and is only legal on the final fallback rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArchetypeCondition {
    /// At least this many universities nearby.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_universities: Option<u32>,
    /// Social pulse strictly above this percentile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_pulse_above: Option<f64>,
    /// Social pulse strictly below this percentile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_pulse_below: Option<f64>,
    /// Office score strictly above this percentile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office_score_above: Option<f64>,
    /// Office score strictly below this percentile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office_score_below: Option<f64>,
    /// Retail gap strictly above this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retail_gap_above: Option<f64>,
    /// Retail gap strictly below this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retail_gap_below: Option<f64>,
    /// The station's dominant time bucket must be exactly this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_bucket: Option<TimeBucket>,
}

impl ArchetypeCondition {
    /// Whether this condition constrains anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_universities.is_none()
            && self.social_pulse_above.is_none()
            && self.social_pulse_below.is_none()
            && self.office_score_above.is_none()
            && self.office_score_below.is_none()
            && self.retail_gap_above.is_none()
            && self.retail_gap_below.is_none()
            && self.dominant_bucket.is_none()
    }
}

/// One named archetype rule in the ordered rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArchetypeRule {
    /// Stable identifier for logs and tests.
    pub name: String,
    /// Archetype assigned when the condition matches.
    pub archetype: Archetype,
    /// Thresholds the station must satisfy.
    #[serde(default)]
    pub when: ArchetypeCondition,
}

/// The narrative produced for one station.
///
/// `base_narrative` is the deterministic ground truth; the polished
/// variant, when present, is a stylistic rewrite of the same facts and
/// never the only copy of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeVerdict {
    /// Station name the verdict describes.
    pub station: String,
    /// Archetype the deterministic layer assigned.
    pub archetype: Archetype,
    /// Short display title (archetype templated with the borough).
    pub persona: String,
    /// Deterministic two-sentence description with concrete numbers.
    pub base_narrative: String,
    /// Optional generative rewrite of `base_narrative`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polished_narrative: Option<String>,
    /// False whenever the generative layer was unavailable or rejected.
    pub is_ai_generated: bool,
}
