#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-city greenspace export pipeline.
//!
//! For each city the pipeline builds a seasonal cloud-free composite,
//! derives the urban polygon, thresholds NDVI at its 75th percentile,
//! computes a search radius and submits three exports (green-mask
//! raster, population raster, summary table). Cities run concurrently and
//! fail independently; see [`batch::run_batch`].
//!
//! Analysis constants live in `params/default.toml` and can be replaced
//! with a file of the same shape (see [`params::AnalysisParams::load`]).

pub mod batch;
pub mod city;
pub mod export;
pub mod ledger;
pub mod params;
pub mod paths;
pub mod preflight;
pub mod progress;
pub mod radius;
pub mod season;
pub mod vegetation;

use std::path::PathBuf;

use greenspace_engine::EngineError;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A TOML file could not be parsed.
    #[error("Failed to parse {path}: {source}")]
    Toml {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Analysis parameters are out of range.
    #[error("Invalid analysis parameters: {message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// Talking to the engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
