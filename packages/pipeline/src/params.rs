//! Analysis parameters.
//!
//! Defaults live in `packages/pipeline/params/default.toml` and are baked
//! into the binary. An operator can replace the whole set with
//! `--params <file>`; the file has the same shape.

use std::path::Path;

use chrono::NaiveDate;
use greenspace_city_models::Hemisphere;
use serde::{Deserialize, Serialize};

use crate::PipelineError;
use crate::season::DayOfYearWindow;

const DEFAULT_PARAMS_TOML: &str = include_str!("../params/default.toml");

/// Every tunable constant of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Acquisition date range and seasonal windows.
    pub season: SeasonParams,
    /// Landsat compositing.
    pub composite: CompositeParams,
    /// Auxiliary dataset ids and band names.
    pub datasets: DatasetParams,
    /// Population raster.
    pub population: PopulationParams,
    /// Urban polygon and vegetation threshold.
    pub vegetation: VegetationParams,
    /// Search radius.
    pub radius: RadiusParams,
    /// Export naming, grid and limits.
    pub export: ExportParams,
    /// Where exports are written.
    pub destination: Destination,
}

/// Acquisition date range and seasonal windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonParams {
    /// First acquisition date (`YYYY-MM-DD`).
    pub start_date: String,
    /// End of the acquisition range (`YYYY-MM-DD`).
    pub end_date: String,
    /// Northern-hemisphere summer.
    pub north: DayOfYearWindow,
    /// Southern-hemisphere summer.
    pub south: DayOfYearWindow,
}

impl SeasonParams {
    /// The window used for `hemisphere`.
    #[must_use]
    pub const fn window(&self, hemisphere: Hemisphere) -> DayOfYearWindow {
        match hemisphere {
            Hemisphere::North => self.north,
            Hemisphere::South => self.south,
        }
    }
}

/// `Landsat.simpleComposite` inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeParams {
    /// Raw-scene collection id.
    pub collection: String,
    /// Cloud score tolerance band.
    pub cloud_score_range: u32,
    /// Maximum scenes considered per location.
    pub max_depth: u32,
    /// Emit floating-point reflectance.
    pub as_float: bool,
    /// Near-infrared band.
    pub nir_band: String,
    /// Red band.
    pub red_band: String,
}

/// Auxiliary datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetParams {
    /// Land/water image.
    pub water: String,
    /// Band of `water` holding the land/water class.
    pub water_band: String,
    /// Class value meaning permanent water.
    pub water_value: i64,
    /// Urban-extent label image collection.
    pub labels: String,
    /// Band of `labels` with the class labels.
    pub label_band: String,
    /// City bounds table.
    pub boundaries: String,
    /// City centers table.
    pub centers: String,
    /// Attribute naming the city in both tables.
    pub city_key: String,
}

/// Population raster inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationParams {
    /// Image collection id.
    pub collection: String,
    /// Epoch start (`YYYY-MM-DD`).
    pub start_date: String,
    /// Epoch end (`YYYY-MM-DD`).
    pub end_date: String,
    /// Population count band.
    pub band: String,
    /// Scale for the population sum in the summary row.
    pub sum_scale_m: f64,
}

/// Urban polygon and vegetation threshold inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationParams {
    /// Scale of the modal-label reduction.
    pub mode_scale_m: f64,
    /// Scale of polygonization.
    pub vectorize_scale_m: f64,
    /// Scale of the NDVI percentile reduction.
    pub percentile_scale_m: f64,
    /// Pixel cap of the percentile reduction.
    pub percentile_max_pixels: u64,
    /// Scale of the green-area sum.
    pub green_area_scale_m: f64,
}

/// Search radius inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusParams {
    /// Cost-distance cap for northern cities.
    pub north_max_distance_m: f64,
    /// Cost-distance cap for southern cities.
    pub south_max_distance_m: f64,
    /// Scale of the max-cost reduction.
    pub max_scale_m: f64,
    /// Error margin of the hand-drawn perimeter.
    pub perimeter_max_error_m: f64,
}

impl RadiusParams {
    /// Cost-distance cap for `hemisphere`.
    #[must_use]
    pub const fn max_distance_m(&self, hemisphere: Hemisphere) -> f64 {
        match hemisphere {
            Hemisphere::North => self.north_max_distance_m,
            Hemisphere::South => self.south_max_distance_m,
        }
    }
}

/// Export naming, grid and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    /// Output CRS.
    pub crs: String,
    /// Projection tag in raster names.
    pub projection_tag: String,
    /// NDVI class raster name prefix.
    pub ndvi_prefix: String,
    /// NDVI class raster scale.
    pub ndvi_scale_m: f64,
    /// Population raster name prefix.
    pub population_prefix: String,
    /// Population raster scale.
    pub population_scale_m: f64,
    /// Summary table name prefix (the city follows directly).
    pub table_prefix: String,
    /// Pixel cap of raster exports.
    pub max_pixels: u64,
    /// Pixel cap of summary-row reductions.
    pub reduce_max_pixels: u64,
    /// Tile scale of summary-row reductions.
    pub tile_scale: u32,
}

/// Export destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    /// Google Drive folders.
    Drive {
        /// Folder for both rasters.
        raster_folder: String,
        /// Folder for summary tables.
        table_folder: String,
    },
    /// Cloud Storage bucket.
    CloudStorage {
        /// Bucket name.
        bucket: String,
        /// Object prefix for rasters.
        raster_prefix: String,
        /// Object prefix for summary tables.
        table_prefix: String,
    },
}

impl Default for AnalysisParams {
    /// The embedded defaults.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `default.toml` is malformed.
    fn default() -> Self {
        toml::from_str(DEFAULT_PARAMS_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse default.toml: {e}"))
    }
}

impl AnalysisParams {
    /// Loads parameters from `path`, or the embedded defaults if `None`,
    /// and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed or
    /// if validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let params = match path {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let params: Self = toml::from_str(&text).map_err(|source| PipelineError::Toml {
                    path: path.to_path_buf(),
                    source,
                })?;
                log::info!("Loaded analysis parameters from {}", path.display());
                params
            }
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks dates, windows, scales and names.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParams`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_range(
            "season",
            &self.season.start_date,
            &self.season.end_date,
        )?;
        check_range(
            "population",
            &self.population.start_date,
            &self.population.end_date,
        )?;

        for (name, window) in [("north", self.season.north), ("south", self.season.south)] {
            if !window.is_valid() {
                return Err(invalid(format!(
                    "season.{name}: days must be within 1..=366, got {}-{}",
                    window.start, window.end
                )));
            }
        }

        let scales = [
            ("population.sum_scale_m", self.population.sum_scale_m),
            ("vegetation.mode_scale_m", self.vegetation.mode_scale_m),
            ("vegetation.vectorize_scale_m", self.vegetation.vectorize_scale_m),
            ("vegetation.percentile_scale_m", self.vegetation.percentile_scale_m),
            ("vegetation.green_area_scale_m", self.vegetation.green_area_scale_m),
            ("radius.north_max_distance_m", self.radius.north_max_distance_m),
            ("radius.south_max_distance_m", self.radius.south_max_distance_m),
            ("radius.max_scale_m", self.radius.max_scale_m),
            ("radius.perimeter_max_error_m", self.radius.perimeter_max_error_m),
            ("export.ndvi_scale_m", self.export.ndvi_scale_m),
            ("export.population_scale_m", self.export.population_scale_m),
        ];
        for (name, value) in scales {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }

        if self.vegetation.percentile_max_pixels == 0
            || self.export.max_pixels == 0
            || self.export.reduce_max_pixels == 0
        {
            return Err(invalid("pixel limits must be positive".to_string()));
        }
        if self.export.tile_scale == 0 {
            return Err(invalid("export.tile_scale must be positive".to_string()));
        }

        let names = [
            ("export.crs", &self.export.crs),
            ("export.ndvi_prefix", &self.export.ndvi_prefix),
            ("export.population_prefix", &self.export.population_prefix),
            ("export.table_prefix", &self.export.table_prefix),
            ("datasets.city_key", &self.datasets.city_key),
        ];
        for (name, value) in names {
            if value.trim().is_empty() {
                return Err(invalid(format!("{name} is empty")));
            }
        }

        match &self.destination {
            Destination::Drive {
                raster_folder,
                table_folder,
            } if raster_folder.is_empty() || table_folder.is_empty() => {
                Err(invalid("destination folders are empty".to_string()))
            }
            Destination::CloudStorage { bucket, .. } if bucket.is_empty() => {
                Err(invalid("destination.bucket is empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn check_range(section: &str, start: &str, end: &str) -> Result<(), PipelineError> {
    let parse = |field: &str, value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| invalid(format!("{section}.{field} {value:?}: {e}")))
    };
    let start_date = parse("start_date", start)?;
    let end_date = parse("end_date", end)?;
    if start_date >= end_date {
        return Err(invalid(format!(
            "{section}: start_date {start} is not before end_date {end}"
        )));
    }
    Ok(())
}

const fn invalid(message: String) -> PipelineError {
    PipelineError::InvalidParams { message }
}
