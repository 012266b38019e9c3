//! One city, end to end.
//!
//! [`build_products`] assembles every deferred value the exports need
//! (nothing is evaluated), [`run_city`] optionally preflights them and
//! submits the three exports. A failure aborts only the city it belongs
//! to.

use greenspace_city_models::{BoundarySource, ResolvedCity};
use greenspace_engine::EngineApi;
use greenspace_engine::objects::{FeatureCollection, Geometry, Image, ImageCollection};
use serde::Serialize;

use crate::export::{self, ArtifactKind};
use crate::params::AnalysisParams;
use crate::radius::{self, SearchCircle};
use crate::season;
use crate::vegetation::{self, Threshold};

/// Why a city produced fewer than three exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CityFailure {
    /// The seasonal collection is empty or could not be evaluated.
    #[error("No imagery: {message}")]
    NoImagery {
        /// Engine message or probe result.
        message: String,
    },

    /// The analysis polygon, center or radius is unusable.
    #[error("Degenerate geometry: {message}")]
    DegenerateGeometry {
        /// What was wrong.
        message: String,
    },

    /// The engine refused an export.
    #[error("Export {artifact} rejected: {message}")]
    ExportRejected {
        /// Which export.
        artifact: ArtifactKind,
        /// Engine message.
        message: String,
    },

    /// A request body could not be encoded.
    #[error("Failed to encode request: {message}")]
    Encoding {
        /// Encoder message.
        message: String,
    },
}

/// Every deferred value computed for one city.
#[derive(Debug, Clone)]
pub struct CityProducts {
    /// City name.
    pub city: String,
    /// One-row bounds collection carrying the city's properties.
    pub bounds: FeatureCollection,
    /// Seasonal scenes before compositing.
    pub imagery: ImageCollection,
    /// Polygon the threshold and radius are computed over.
    pub region: Geometry,
    /// City center.
    pub center: Geometry,
    /// NDVI threshold and green mask.
    pub threshold: Threshold,
    /// Search radius and export circle.
    pub circle: SearchCircle,
    /// Population mosaic.
    pub population: Image,
    /// Literal boundary ring of a hand-drawn city.
    pub hand_drawn_ring: Option<Vec<[f64; 2]>>,
}

/// Builds the deferred values for `city`.
#[must_use]
pub fn build_products(params: &AnalysisParams, city: &ResolvedCity) -> CityProducts {
    let bounds = vegetation::city_bounds(params, city);
    let hand_drawn_ring = match &city.boundary {
        BoundarySource::HandDrawn { coordinates, .. } => Some(coordinates.clone()),
        BoundarySource::Dataset => None,
    };

    let imagery = season::seasonal_collection(params, city.hemisphere);
    let ndvi = vegetation::ndvi(params, &season::composite(params, &imagery));

    let region = vegetation::analysis_region(params, city, &bounds);
    let threshold = vegetation::threshold(params, &ndvi, &region);

    let center = radius::center(params, city);
    let circle = if city.is_hand_drawn() {
        log::debug!("{}: perimeter radius", city.name);
        radius::perimeter_fraction(params, &center, &region)
    } else {
        log::debug!("{}: cost-distance radius", city.name);
        radius::cost_distance(params, city, &center, &region)
    };

    CityProducts {
        city: city.name.clone(),
        bounds,
        imagery,
        region,
        center,
        threshold,
        circle,
        population: export::population(params),
        hand_drawn_ring,
    }
}

/// Options shared by every city of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Suffix of every output name, usually `YYYYMMDD`.
    pub run_tag: String,
    /// Evaluate the preflight probes before submitting.
    pub preflight: bool,
}

/// One accepted export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Submission {
    /// City name.
    pub city: String,
    /// Artifact produced.
    pub kind: ArtifactKind,
    /// Task description.
    pub description: String,
    /// Operation name returned by the engine.
    pub operation: String,
    /// Request id sent with the job.
    pub request_id: Option<String>,
    /// SHA-256 of the exported expression.
    pub digest: String,
}

/// What happened to one city.
#[derive(Debug, Clone, Serialize)]
pub struct CityReport {
    /// City name.
    pub city: String,
    /// Exports accepted before any failure.
    pub submissions: Vec<Submission>,
    /// Failure that stopped the city, if any.
    pub failure: Option<CityFailure>,
}

impl CityReport {
    /// All three exports were accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs one city: build, preflight, submit.
///
/// Exports are submitted in order (NDVI raster, population raster,
/// table); the first rejection stops the remaining ones.
pub async fn run_city(
    engine: &dyn EngineApi,
    params: &AnalysisParams,
    city: &ResolvedCity,
    options: &RunOptions,
) -> CityReport {
    let mut report = CityReport {
        city: city.name.clone(),
        submissions: Vec::new(),
        failure: None,
    };

    if let Err(failure) = submit(engine, params, city, options, &mut report.submissions).await {
        log::warn!("{}: {failure}", city.name);
        report.failure = Some(failure);
    }

    report
}

async fn submit(
    engine: &dyn EngineApi,
    params: &AnalysisParams,
    city: &ResolvedCity,
    options: &RunOptions,
    submissions: &mut Vec<Submission>,
) -> Result<(), CityFailure> {
    let products = build_products(params, city);

    if options.preflight {
        let probe = crate::preflight::check(engine, params, &products).await?;
        if let Some(radius) = probe.radius {
            log::info!("{}: search radius {radius:.0} m", city.name);
        }
    }

    let jobs = export::build_jobs(params, &products, &options.run_tag).map_err(|e| {
        CityFailure::Encoding {
            message: e.to_string(),
        }
    })?;

    for job in jobs {
        let operation = job
            .submit(engine)
            .await
            .map_err(|e| CityFailure::ExportRejected {
                artifact: job.kind,
                message: e.to_string(),
            })?;

        log::info!("{}: submitted {} as {}", city.name, job.description, operation.name);
        submissions.push(Submission {
            city: city.name.clone(),
            kind: job.kind,
            request_id: job.request_id().map(str::to_string),
            description: job.description,
            operation: operation.name,
            digest: job.digest,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use greenspace_city_models::{CenterSource, CityOverride, Hemisphere};
    use greenspace_engine::recording::{RecordedRequest, RecordingEngine};

    use super::*;

    fn city(name: &str, hand_drawn: bool) -> ResolvedCity {
        ResolvedCity {
            name: name.to_string(),
            hemisphere: Hemisphere::North,
            boundary: if hand_drawn {
                BoundarySource::HandDrawn {
                    coordinates: vec![[74.46, 15.92], [74.46, 15.80], [74.56, 15.80], [74.56, 15.92]],
                    properties: BTreeMap::from([("City".to_string(), serde_json::json!(name))]),
                }
            } else {
                BoundarySource::Dataset
            },
            center: CenterSource::Dataset,
            tuning: CityOverride::default(),
        }
    }

    fn options(preflight: bool) -> RunOptions {
        RunOptions {
            run_tag: "20230321".to_string(),
            preflight,
        }
    }

    #[tokio::test]
    async fn submits_three_exports_in_order() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new();

        let report = run_city(&engine, &params, &city("Accra", false), &options(false)).await;

        assert!(report.is_success());
        let kinds: Vec<_> = report.submissions.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ArtifactKind::NdviRaster,
                ArtifactKind::PopulationRaster,
                ArtifactKind::SummaryTable,
            ]
        );
        assert_eq!(engine.exports().len(), 3);
        assert!(
            engine
                .requests()
                .iter()
                .all(|r| !matches!(r, RecordedRequest::Compute { .. }))
        );
    }

    #[tokio::test]
    async fn rejection_stops_remaining_exports() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new().with_export_rejection(|description| {
            description
                .starts_with("Pop_BoundingCircle")
                .then(|| "asset not found".to_string())
        });

        let report = run_city(&engine, &params, &city("Accra", false), &options(false)).await;

        assert_eq!(report.submissions.len(), 1);
        assert!(matches!(
            report.failure,
            Some(CityFailure::ExportRejected {
                artifact: ArtifactKind::PopulationRaster,
                ..
            })
        ));
        assert_eq!(engine.exports().len(), 1);
    }

    #[tokio::test]
    async fn failed_preflight_submits_nothing() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new();

        // The default responder answers null, i.e. no scenes.
        let report = run_city(&engine, &params, &city("Accra", false), &options(true)).await;

        assert!(matches!(report.failure, Some(CityFailure::NoImagery { .. })));
        assert!(report.submissions.is_empty());
        assert!(engine.exports().is_empty());
    }

    #[test]
    fn hand_drawn_cities_use_the_perimeter_radius() {
        let params = AnalysisParams::default();

        let drawn = build_products(&params, &city("Belgaum", true));
        assert_eq!(drawn.circle.radius.node().function_name(), Some("Number.divide"));
        assert!(drawn.imagery.node().find_invocations("Filter.intersects").is_empty());
        assert!(drawn.hand_drawn_ring.is_some());

        let dataset = build_products(&params, &city("Accra", false));
        assert_eq!(
            dataset.circle.radius.node().find_invocations("Image.cumulativeCost").len(),
            1
        );
        assert!(dataset.imagery.node().find_invocations("Filter.intersects").is_empty());
    }

    #[test]
    fn failures_serialize_with_kind_tag() {
        let failure = CityFailure::ExportRejected {
            artifact: ArtifactKind::SummaryTable,
            message: "quota".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({"kind": "export_rejected", "artifact": "summary_table", "message": "quota"})
        );
    }
}
