#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! City selection for a run.
//!
//! The embedded [`registry`] lists every city the analysis covers. An
//! operator-supplied override file ([`overrides`]) adds per-city
//! adjustments and hand-drawn boundaries, and [`resolve`] turns a
//! hemisphere plus an optional list of names into fully resolved cities,
//! rejecting bad input before anything is sent to the engine.

pub mod overrides;
pub mod registry;
pub mod resolve;

use std::path::PathBuf;

use greenspace_city_models::Hemisphere;

/// Errors in the city configuration. All of them are reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum CityConfigError {
    /// Override file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Override file is not valid TOML or has the wrong shape.
    #[error("Failed to parse {path}: {source}")]
    Toml {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// City is not in the catalog.
    #[error("Unknown city: {name}")]
    UnknownCity {
        /// Requested name.
        name: String,
    },

    /// City was requested (or configured) more than once.
    #[error("Duplicate city: {name}")]
    DuplicateCity {
        /// Repeated name.
        name: String,
    },

    /// City belongs to the other hemisphere.
    #[error("{name} is a {actual} hemisphere city, but the run is for the {expected} hemisphere")]
    HemisphereMismatch {
        /// City name.
        name: String,
        /// Hemisphere of the run.
        expected: Hemisphere,
        /// Hemisphere in the catalog.
        actual: Hemisphere,
    },

    /// City needs a hand-drawn boundary and none was supplied.
    #[error("{name} requires a [[hand_drawn]] boundary in the overrides file")]
    MissingHandDrawn {
        /// City name.
        name: String,
    },

    /// A hand-drawn boundary or override value is unusable.
    #[error("Invalid configuration for {city}: {message}")]
    Invalid {
        /// City name.
        city: String,
        /// What is wrong.
        message: String,
    },
}
