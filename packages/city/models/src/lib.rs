#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! City catalog and per-city override types.
//!
//! A city is identified by the value of its `City` attribute in the
//! remote boundary and center tables. Most cities take both their
//! boundary and their center from those tables; cities too small for the
//! label-derived boundary get a hand-drawn polygon from the operator's
//! override file instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which summer a city's composite is built from.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Hemisphere {
    /// June solstice to September equinox.
    North,
    /// December solstice to March equinox.
    South,
}

/// One entry of the embedded city catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCity {
    /// Value of the `City` attribute in the remote tables.
    pub name: String,
    /// Hemisphere the city is processed with.
    pub hemisphere: Hemisphere,
    /// The label-derived boundary is unusable for this city; it can only
    /// be processed with a hand-drawn boundary.
    #[serde(default)]
    pub requires_hand_drawn: bool,
}

/// Scale used when computing the modal label inside the city bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeScale {
    /// A fixed scale in meters.
    Fixed {
        /// Scale in meters.
        meters: f64,
    },
    /// The label image's own nominal scale.
    Nominal,
}

/// Per-city adjustments to the generic procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityOverride {
    /// City this entry applies to.
    pub city: String,
    /// Added to the rounded modal label before isolating city pixels.
    #[serde(default)]
    pub mode_offset: i64,
    /// Replaces the default modal-label scale.
    #[serde(default)]
    pub mode_scale: Option<ModeScale>,
    /// Replaces the hemisphere's cost-distance cap, in meters.
    #[serde(default)]
    pub cost_max_distance_m: Option<f64>,
}

/// An operator-drawn boundary polygon for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDrawnBoundary {
    /// City this boundary applies to.
    pub city: String,
    /// Exterior ring as `[longitude, latitude]` pairs.
    pub coordinates: Vec<[f64; 2]>,
    /// Literal center; defaults to the center table entry.
    #[serde(default)]
    pub center: Option<[f64; 2]>,
    /// Extra properties copied into the summary row (e.g. `TARGET_FID`).
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Contents of an override file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideFile {
    /// `[[override]]` tables.
    #[serde(default, rename = "override")]
    pub overrides: Vec<CityOverride>,
    /// `[[hand_drawn]]` tables.
    #[serde(default)]
    pub hand_drawn: Vec<HandDrawnBoundary>,
}

/// Where a city's boundary comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundarySource {
    /// Row of the boundary table whose `City` matches; the analysis
    /// polygon is derived from the modal label inside it.
    Dataset,
    /// Literal polygon; the polygon is used as-is.
    HandDrawn {
        /// Exterior ring as `[longitude, latitude]` pairs.
        coordinates: Vec<[f64; 2]>,
        /// Properties of the summary row.
        properties: BTreeMap<String, serde_json::Value>,
    },
}

/// Where a city's center point comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CenterSource {
    /// Row of the center table whose `City` matches.
    Dataset,
    /// Literal `[longitude, latitude]`.
    Literal {
        /// Longitude in degrees.
        lon: f64,
        /// Latitude in degrees.
        lat: f64,
    },
}

/// A city with every input needed to build its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCity {
    /// City name.
    pub name: String,
    /// Hemisphere.
    pub hemisphere: Hemisphere,
    /// Boundary source.
    pub boundary: BoundarySource,
    /// Center source.
    pub center: CenterSource,
    /// Adjustments (all defaults when the city has no override).
    pub tuning: CityOverride,
}

impl ResolvedCity {
    /// Whether the small-city fallback applies.
    #[must_use]
    pub const fn is_hand_drawn(&self) -> bool {
        matches!(self.boundary, BoundarySource::HandDrawn { .. })
    }
}
