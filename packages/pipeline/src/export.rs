//! Export requests for one city.
//!
//! Every city produces three independent exports: the green-mask raster,
//! the population raster (both bounded by the search circle) and a
//! one-row summary table without geometry.
//!
//! Request ids are derived from the run tag, the description and the
//! expression digest, so resubmitting an unchanged job within the same
//! run never starts a second task.

use greenspace_engine::objects::{
    DateRange, FeatureCollection, Geometry, Image, ImageCollection, Number, Projection, Reducer,
    RegionReduction,
};
use greenspace_engine::{EngineApi, EngineError, serialize};
use greenspace_engine_models::{
    DriveDestination, ExportImageRequest, ExportTableRequest, FileExportOptions, FileFormat,
    GcsDestination, Operation, PixelGrid,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::city::CityProducts;
use crate::params::{AnalysisParams, Destination};
use crate::vegetation::NDVI_BAND;

/// The computed fields of the summary row, in column order.
pub const SUMMARY_FIELDS: [&str; 4] = ["radius", "pop2015", "NDVIthresh", "greenArea"];

/// What an export produces.
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
pub enum ArtifactKind {
    /// `NDVI >= threshold` raster.
    NdviRaster,
    /// Population count raster.
    PopulationRaster,
    /// Summary table row.
    SummaryTable,
}

/// A ready-to-submit export request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportRequest {
    /// `image:export` body.
    Image(ExportImageRequest),
    /// `table:export` body.
    Table(ExportTableRequest),
}

/// One export for one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportJob {
    /// Artifact produced.
    pub kind: ArtifactKind,
    /// Task description (also the output file name).
    pub description: String,
    /// SHA-256 of the exported expression.
    pub digest: String,
    /// Request body.
    pub request: ExportRequest,
}

impl ExportJob {
    /// The request id sent with the job.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match &self.request {
            ExportRequest::Image(r) => r.request_id.as_deref(),
            ExportRequest::Table(r) => r.request_id.as_deref(),
        }
    }

    /// Submits the job.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine refuses the request.
    pub async fn submit(&self, engine: &dyn EngineApi) -> Result<Operation, EngineError> {
        match &self.request {
            ExportRequest::Image(r) => engine.export_image(r).await,
            ExportRequest::Table(r) => engine.export_table(r).await,
        }
    }
}

/// The population-count mosaic for the configured epoch.
#[must_use]
pub fn population(params: &AnalysisParams) -> Image {
    let p = &params.population;
    ImageCollection::load(&p.collection)
        .filter_date(&DateRange::new(&p.start_date, &p.end_date))
        .mosaic()
        .select(&[p.band.as_str()])
}

/// Summary row: the city's properties plus [`SUMMARY_FIELDS`], with the
/// geometry removed.
#[must_use]
pub fn summary_row(params: &AnalysisParams, products: &CityProducts) -> FeatureCollection {
    let circle = &products.circle.circle;
    let reduce_sum = |image: &Image, scale: f64| {
        image.reduce_region(RegionReduction {
            reducer: Reducer::sum(),
            geometry: circle.clone(),
            scale: Number::from(scale),
            max_pixels: Some(params.export.reduce_max_pixels),
            tile_scale: Some(params.export.tile_scale),
        })
    };

    let population_sum = reduce_sum(
        &products.population.clip(circle),
        params.population.sum_scale_m,
    )
    .get(&params.population.band);

    let green_area = reduce_sum(
        &products
            .threshold
            .mask
            .self_mask()
            .multiply(&Image::pixel_area()),
        params.vegetation.green_area_scale_m,
    )
    .get(NDVI_BAND);

    let values = [
        products.circle.radius.clone(),
        population_sum,
        products.threshold.value.clone(),
        green_area,
    ];

    let row = SUMMARY_FIELDS
        .iter()
        .zip(values)
        .fold(products.bounds.first(), |feature, (field, value)| {
            feature.set(field, value)
        })
        .set_geometry(None);

    FeatureCollection::from_features([row])
}

/// Output name of a raster export.
#[must_use]
pub fn raster_description(params: &AnalysisParams, prefix: &str, city: &str, run_tag: &str) -> String {
    format!("{prefix}_{city}_{}_{run_tag}", params.export.projection_tag)
}

/// Output name of the summary table export.
#[must_use]
pub fn table_description(params: &AnalysisParams, city: &str, run_tag: &str) -> String {
    format!("{}{city}{run_tag}", params.export.table_prefix)
}

/// Deterministic request id for a job (UUID-formatted).
#[must_use]
pub fn request_id(run_tag: &str, description: &str, digest: &str) -> String {
    let hash = Sha256::new()
        .chain_update(run_tag)
        .chain_update([0_u8])
        .chain_update(description)
        .chain_update([0_u8])
        .chain_update(digest)
        .finalize();
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

fn file_options(params: &AnalysisParams, kind: ArtifactKind, description: &str) -> FileExportOptions {
    let file_format = match kind {
        ArtifactKind::SummaryTable => FileFormat::Csv,
        ArtifactKind::NdviRaster | ArtifactKind::PopulationRaster => FileFormat::GeoTiff,
    };

    match &params.destination {
        Destination::Drive {
            raster_folder,
            table_folder,
        } => FileExportOptions {
            file_format,
            drive_destination: Some(DriveDestination {
                folder: match kind {
                    ArtifactKind::SummaryTable => table_folder.clone(),
                    _ => raster_folder.clone(),
                },
                filename_prefix: description.to_string(),
            }),
            gcs_destination: None,
        },
        Destination::CloudStorage {
            bucket,
            raster_prefix,
            table_prefix,
        } => {
            let prefix = match kind {
                ArtifactKind::SummaryTable => table_prefix,
                _ => raster_prefix,
            };
            let prefix = prefix.trim_matches('/');
            FileExportOptions {
                file_format,
                drive_destination: None,
                gcs_destination: Some(GcsDestination {
                    bucket: bucket.clone(),
                    filename_prefix: if prefix.is_empty() {
                        description.to_string()
                    } else {
                        format!("{prefix}/{description}")
                    },
                }),
            }
        }
    }
}

fn raster_job(
    params: &AnalysisParams,
    kind: ArtifactKind,
    description: String,
    image: &Image,
    region: &Geometry,
    scale: f64,
    run_tag: &str,
) -> Result<ExportJob, serde_json::Error> {
    let crs = &params.export.crs;
    let image = image
        .reproject(&Projection::new(crs).at_scale(scale))
        .clip_to_bounds_and_scale(region, scale);

    let expression = serialize::to_expression(image.node())?;
    let digest = serialize::digest(&expression)?;

    Ok(ExportJob {
        kind,
        request: ExportRequest::Image(ExportImageRequest {
            expression,
            file_export_options: file_options(params, kind, &description),
            grid: Some(PixelGrid {
                crs_code: crs.clone(),
            }),
            max_pixels: Some(params.export.max_pixels),
            request_id: Some(request_id(run_tag, &description, &digest)),
            description: description.clone(),
        }),
        description,
        digest,
    })
}

/// Builds the three export jobs for a city, in submission order.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if an expression cannot be encoded.
pub fn build_jobs(
    params: &AnalysisParams,
    products: &CityProducts,
    run_tag: &str,
) -> Result<Vec<ExportJob>, serde_json::Error> {
    let city = &products.city;
    let circle = &products.circle.circle;
    let e = &params.export;

    let ndvi = raster_job(
        params,
        ArtifactKind::NdviRaster,
        raster_description(params, &e.ndvi_prefix, city, run_tag),
        &products.threshold.mask,
        circle,
        e.ndvi_scale_m,
        run_tag,
    )?;

    let population = raster_job(
        params,
        ArtifactKind::PopulationRaster,
        raster_description(params, &e.population_prefix, city, run_tag),
        &products.population,
        circle,
        e.population_scale_m,
        run_tag,
    )?;

    let description = table_description(params, city, run_tag);
    let expression = serialize::to_expression(summary_row(params, products).node())?;
    let digest = serialize::digest(&expression)?;
    let table = ExportJob {
        kind: ArtifactKind::SummaryTable,
        request: ExportRequest::Table(ExportTableRequest {
            expression,
            file_export_options: file_options(params, ArtifactKind::SummaryTable, &description),
            request_id: Some(request_id(run_tag, &description, &digest)),
            description: description.clone(),
        }),
        description,
        digest,
    };

    Ok(vec![ndvi, population, table])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use greenspace_city_models::{
        BoundarySource, CenterSource, CityOverride, Hemisphere, ResolvedCity,
    };
    use greenspace_engine::Node;
    use greenspace_engine::expr::NodeKind;
    use greenspace_engine_models::ValueNode;

    use super::*;
    use crate::city::build_products;

    fn accra() -> ResolvedCity {
        ResolvedCity {
            name: "Accra".to_string(),
            hemisphere: Hemisphere::North,
            boundary: BoundarySource::Dataset,
            center: CenterSource::Dataset,
            tuning: CityOverride::default(),
        }
    }

    fn pokhara() -> ResolvedCity {
        ResolvedCity {
            name: "Pokhara".to_string(),
            hemisphere: Hemisphere::North,
            boundary: BoundarySource::HandDrawn {
                coordinates: vec![[83.96, 28.25], [83.96, 28.18], [84.01, 28.18], [84.01, 28.25]],
                properties: BTreeMap::from([
                    ("City".to_string(), serde_json::json!("Pokhara")),
                    ("TARGET_FID".to_string(), serde_json::json!(109)),
                ]),
            },
            center: CenterSource::Dataset,
            tuning: CityOverride::default(),
        }
    }

    fn set_keys(node: &Node) -> Vec<String> {
        node.find_invocations("Element.set")
            .into_iter()
            .filter_map(|call| call.argument("key").and_then(Node::as_constant))
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn names_follow_the_output_conventions() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());
        let jobs = build_jobs(&params, &products, "20230321").unwrap();

        let names: Vec<&str> = jobs.iter().map(|j| j.description.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "CCA_NDVI_Accra_WGS84m_20230321",
                "Pop_BoundingCircle_Accra_WGS84m_20230321",
                "boundingCircleValues_Accra20230321",
            ]
        );
    }

    #[test]
    fn rasters_use_world_mercator_and_configured_scales() {
        let params = AnalysisParams::default();
        let jobs = build_jobs(&params, &build_products(&params, &accra()), "20230321").unwrap();

        let scales: Vec<_> = jobs[..2]
            .iter()
            .map(|job| {
                let ExportRequest::Image(request) = &job.request else {
                    panic!("expected image export");
                };
                assert_eq!(request.grid.as_ref().unwrap().crs_code, "EPSG:3395");
                assert_eq!(request.max_pixels, Some(10_000_000_000));
                let drive = request.file_export_options.drive_destination.as_ref().unwrap();
                assert_eq!(drive.folder, "CCAExport_GlobalGreenspace");
                assert_eq!(drive.filename_prefix, job.description);

                let root = &request.expression.values[&request.expression.result];
                let ValueNode::FunctionInvocationValue {
                    function_name,
                    arguments,
                } = root
                else {
                    panic!("expected invocation root");
                };
                assert_eq!(function_name, "Image.clipToBoundsAndScale");
                arguments["scale"].clone()
            })
            .collect();

        assert_eq!(
            scales,
            vec![
                ValueNode::ConstantValue(serde_json::json!(30.0)),
                ValueNode::ConstantValue(serde_json::json!(38.0)),
            ]
        );
    }

    #[test]
    fn summary_row_has_no_geometry_and_four_computed_fields() {
        let params = AnalysisParams::default();

        for city in [accra(), pokhara()] {
            let products = build_products(&params, &city);
            let row = summary_row(&params, &products);

            let mut keys = set_keys(row.node());
            keys.sort();
            let mut expected: Vec<String> = SUMMARY_FIELDS.iter().map(ToString::to_string).collect();
            expected.sort();
            assert_eq!(keys, expected, "{}", city.name);

            let features = row.node().argument("features").unwrap();
            let NodeKind::Array(items) = features.kind() else {
                panic!("features is an array");
            };
            assert_eq!(items.len(), 1);
            let feature = &items[0];
            assert_eq!(feature.function_name(), Some("Feature.setGeometry"));
            assert_eq!(
                feature.argument("geometry").and_then(Node::as_constant),
                Some(&serde_json::Value::Null)
            );
        }
    }

    #[test]
    fn table_goes_to_table_folder_as_csv() {
        let params = AnalysisParams::default();
        let jobs = build_jobs(&params, &build_products(&params, &pokhara()), "20230316").unwrap();

        let ExportRequest::Table(table) = &jobs[2].request else {
            panic!("expected table export");
        };
        assert_eq!(table.file_export_options.file_format, FileFormat::Csv);
        assert_eq!(
            table.file_export_options.drive_destination.as_ref().unwrap().folder,
            "CCATableExport_GlobalGreenspace"
        );
    }

    #[test]
    fn cloud_storage_prefixes_are_joined() {
        let mut params = AnalysisParams::default();
        params.destination = Destination::CloudStorage {
            bucket: "greenspace".to_string(),
            raster_prefix: "rasters/".to_string(),
            table_prefix: String::new(),
        };
        let jobs = build_jobs(&params, &build_products(&params, &accra()), "20230321").unwrap();

        let ExportRequest::Image(ndvi) = &jobs[0].request else {
            panic!("expected image export");
        };
        let gcs = ndvi.file_export_options.gcs_destination.as_ref().unwrap();
        assert_eq!(gcs.bucket, "greenspace");
        assert_eq!(gcs.filename_prefix, "rasters/CCA_NDVI_Accra_WGS84m_20230321");

        let ExportRequest::Table(table) = &jobs[2].request else {
            panic!("expected table export");
        };
        assert_eq!(
            table.file_export_options.gcs_destination.as_ref().unwrap().filename_prefix,
            "boundingCircleValues_Accra20230321"
        );
    }

    #[test]
    fn rebuilding_yields_identical_requests() {
        let params = AnalysisParams::default();

        for city in [accra(), pokhara()] {
            let first = build_jobs(&params, &build_products(&params, &city), "20230321").unwrap();
            let second = build_jobs(&params, &build_products(&params, &city), "20230321").unwrap();

            assert_eq!(first, second);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }

    #[test]
    fn request_id_depends_on_run_tag_and_content() {
        let a = request_id("20230321", "CCA_NDVI_Accra_WGS84m_20230321", "abc");
        assert_eq!(a, request_id("20230321", "CCA_NDVI_Accra_WGS84m_20230321", "abc"));
        assert_ne!(a, request_id("20230322", "CCA_NDVI_Accra_WGS84m_20230321", "abc"));
        assert_ne!(a, request_id("20230321", "CCA_NDVI_Accra_WGS84m_20230321", "abd"));
        assert_eq!(a.len(), 36);
    }
}
