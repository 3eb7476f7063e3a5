#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Borough labels and linear boundary rule types.
//!
//! NYC's inter-borough boundaries (the East River in particular) are not
//! axis-aligned, so classification uses ordered linear decision rules
//! instead of bounding boxes or polygon containment. These types model
//! that ruleset; evaluation lives in `metro_pulse_geography`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A New York City borough label.
///
/// `Unknown` is the designated default for points no rule claims (or
/// points with missing coordinates) and displays as the city-wide "NYC"
/// label.
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
pub enum Borough {
    /// Manhattan.
    Manhattan,
    /// Brooklyn.
    Brooklyn,
    /// Queens.
    Queens,
    /// The Bronx.
    Bronx,
    /// Staten Island.
    #[strum(serialize = "Staten Island")]
    #[serde(rename = "Staten Island")]
    StatenIsland,
    /// No rule matched; displayed as the city-wide label.
    #[strum(serialize = "NYC")]
    #[serde(rename = "NYC")]
    Unknown,
}

/// A line in slope-intercept form over latitude:
/// `lon_boundary = slope * lat + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryLine {
    /// Longitude change per degree of latitude.
    pub slope: f64,
    /// Longitude at latitude zero.
    pub intercept: f64,
}

impl BoundaryLine {
    /// Evaluates the boundary longitude at a latitude.
    #[must_use]
    pub fn lon_at(&self, lat: f64) -> f64 {
        self.slope.mul_add(lat, self.intercept)
    }
}

/// Conjunction of predicates a point must satisfy for a rule to match.
///
/// Every present field must hold; absent fields are unconstrained. An
/// entirely empty condition matches every point, which is only legal on
/// the final catch-all rule of a set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoundaryCondition {
    /// Point latitude must be strictly above this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_above: Option<f64>,
    /// Point latitude must be at most this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_at_most: Option<f64>,
    /// Point longitude must be strictly above (east of) this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_above: Option<f64>,
    /// Point longitude must be strictly below (west of) this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_below: Option<f64>,
    /// Point must lie west of this diagonal evaluated at its latitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub west_of_line: Option<BoundaryLine>,
}

impl BoundaryCondition {
    /// Whether this condition constrains anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lat_above.is_none()
            && self.lat_at_most.is_none()
            && self.lon_above.is_none()
            && self.lon_below.is_none()
            && self.west_of_line.is_none()
    }

    /// Tests a point against every present predicate.
    #[must_use]
    pub fn matches(&self, lat: f64, lon: f64) -> bool {
        if let Some(v) = self.lat_above {
            if lat <= v {
                return false;
            }
        }
        if let Some(v) = self.lat_at_most {
            if lat > v {
                return false;
            }
        }
        if let Some(v) = self.lon_above {
            if lon <= v {
                return false;
            }
        }
        if let Some(v) = self.lon_below {
            if lon >= v {
                return false;
            }
        }
        if let Some(line) = self.west_of_line {
            if lon >= line.lon_at(lat) {
                return false;
            }
        }
        true
    }
}

/// One named boundary rule: a condition and the borough it assigns.
///
/// Rules live in an ordered list evaluated top to bottom; the first
/// matching rule wins. Order is part of the configuration contract —
/// reordering overlapping rules changes corner-case results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoundaryRule {
    /// Stable identifier for logs and tests.
    pub name: String,
    /// Borough assigned when the condition matches.
    pub borough: Borough,
    /// Predicates the point must satisfy.
    #[serde(default)]
    pub when: BoundaryCondition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn borough_display_round_trips() {
        assert_eq!(Borough::StatenIsland.to_string(), "Staten Island");
        assert_eq!(Borough::from_str("Staten Island").unwrap(), Borough::StatenIsland);
        assert_eq!(Borough::Unknown.to_string(), "NYC");
    }

    #[test]
    fn line_evaluates_slope_intercept() {
        let line = BoundaryLine {
            slope: 0.8,
            intercept: -106.554,
        };
        assert!((line.lon_at(40.68) - -74.01).abs() < 1e-9);
    }

    #[test]
    fn empty_condition_matches_everything() {
        let cond = BoundaryCondition::default();
        assert!(cond.is_empty());
        assert!(cond.matches(40.0, -74.0));
    }

    #[test]
    fn condition_predicates_are_conjunctive() {
        let cond = BoundaryCondition {
            lat_above: Some(40.7),
            lon_below: Some(-73.9),
            ..BoundaryCondition::default()
        };
        assert!(cond.matches(40.75, -73.95));
        assert!(!cond.matches(40.65, -73.95));
        assert!(!cond.matches(40.75, -73.85));
    }
}
