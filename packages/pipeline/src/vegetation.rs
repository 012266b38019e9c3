//! Urban polygon and vegetation threshold.
//!
//! Dataset cities derive their analysis polygon from the urban-extent
//! labels: the most frequent label inside the city bounds is taken as
//! the urban core, its pixels are isolated and polygonized. Hand-drawn
//! cities use their literal polygon. The NDVI of the water-masked
//! composite is then thresholded at its 75th percentile inside that
//! polygon.

use greenspace_city_models::{BoundarySource, ModeScale, ResolvedCity};
use greenspace_engine::Node;
use greenspace_engine::objects::{
    Feature, FeatureCollection, Filter, Geometry, Image, ImageCollection, Number, Reducer,
    RegionReduction,
};

use crate::params::AnalysisParams;

/// Percentile of NDVI inside the urban polygon used as the green
/// threshold.
pub const PERCENTILE: u8 = 75;

/// Name of the NDVI band.
pub const NDVI_BAND: &str = "NDVI";

/// The city's bounds as a one-row feature collection, carrying the
/// properties that end up in the summary table.
#[must_use]
pub fn city_bounds(params: &AnalysisParams, city: &ResolvedCity) -> FeatureCollection {
    match &city.boundary {
        BoundarySource::Dataset => FeatureCollection::load(&params.datasets.boundaries)
            .filter(&Filter::equals(&params.datasets.city_key, city.name.as_str())),
        BoundarySource::HandDrawn {
            coordinates,
            properties,
        } => {
            let polygon = Geometry::polygon(coordinates);
            let properties = properties
                .iter()
                .map(|(k, v)| (k.as_str(), Node::constant(v.clone())));
            FeatureCollection::from_features([Feature::new(Some(&polygon), properties)])
        }
    }
}

/// Pixels the global land/water mask marks as land.
#[must_use]
pub fn land_mask(params: &AnalysisParams) -> Image {
    let d = &params.datasets;
    Image::load(&d.water)
        .select(&[d.water_band.as_str()])
        .eq(&Image::constant(d.water_value))
        .not()
}

/// NDVI of the composite with water removed, as a single `NDVI` band.
#[must_use]
pub fn ndvi(params: &AnalysisParams, composite: &Image) -> Image {
    let c = &params.composite;
    composite
        .mask(&land_mask(params))
        .normalized_difference(&c.nir_band, &c.red_band)
        .rename(&[NDVI_BAND])
}

fn label_mosaic(params: &AnalysisParams) -> Image {
    ImageCollection::load(&params.datasets.labels)
        .mosaic()
        .select(&[params.datasets.label_band.as_str()])
}

/// Rounded modal label inside the bounds, plus the city's offset.
#[must_use]
pub fn urban_label(
    params: &AnalysisParams,
    city: &ResolvedCity,
    bounds: &FeatureCollection,
) -> Number {
    let labels = label_mosaic(params);
    let region = bounds.geometry();

    let scale = match city.tuning.mode_scale {
        None => Number::from(params.vegetation.mode_scale_m),
        Some(ModeScale::Fixed { meters }) => Number::from(meters),
        Some(ModeScale::Nominal) => labels.projection().nominal_scale(),
    };

    let mode = labels
        .clip(&region)
        .reduce_region(RegionReduction {
            reducer: Reducer::mode(),
            geometry: region,
            scale,
            max_pixels: None,
            tile_scale: None,
        })
        .get(&params.datasets.label_band)
        .round();

    match city.tuning.mode_offset {
        0 => mode,
        offset => {
            log::debug!("{}: modal label offset {offset:+}", city.name);
            mode.add(offset)
        }
    }
}

/// Polygons of the pixels carrying `label` inside the bounds.
#[must_use]
pub fn urban_polygon(
    params: &AnalysisParams,
    bounds: &FeatureCollection,
    label: &Number,
) -> FeatureCollection {
    let region = bounds.geometry();
    label_mosaic(params)
        .eq(&Image::constant(label.clone()))
        .clip(&region)
        .self_mask()
        .reduce_to_vectors(
            &Reducer::count_every(),
            &region,
            &Number::from(params.vegetation.vectorize_scale_m),
            "polygon",
        )
}

/// The polygon the threshold and the cost-distance radius are computed
/// over.
#[must_use]
pub fn analysis_region(
    params: &AnalysisParams,
    city: &ResolvedCity,
    bounds: &FeatureCollection,
) -> Geometry {
    if city.is_hand_drawn() {
        bounds.geometry()
    } else {
        let label = urban_label(params, city, bounds);
        urban_polygon(params, bounds, &label).geometry()
    }
}

/// The NDVI threshold and the resulting green mask.
#[derive(Debug, Clone)]
pub struct Threshold {
    /// 75th-percentile NDVI inside the analysis region.
    pub value: Number,
    /// `NDVI >= value` (1 = green).
    pub mask: Image,
}

/// Thresholds `ndvi` at its 75th percentile inside `region`.
#[must_use]
pub fn threshold(params: &AnalysisParams, ndvi: &Image, region: &Geometry) -> Threshold {
    let v = &params.vegetation;
    let value = ndvi
        .reduce_region(RegionReduction {
            reducer: Reducer::percentile(&[PERCENTILE]),
            geometry: region.clone(),
            scale: Number::from(v.percentile_scale_m),
            max_pixels: Some(v.percentile_max_pixels),
            tile_scale: None,
        })
        .get(NDVI_BAND);

    let mask = ndvi.gte(&Image::constant(value.clone()));
    Threshold { value, mask }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use greenspace_city_models::{CenterSource, CityOverride, Hemisphere};

    use super::*;

    fn dataset_city(name: &str, tuning: CityOverride) -> ResolvedCity {
        ResolvedCity {
            name: name.to_string(),
            hemisphere: Hemisphere::North,
            boundary: BoundarySource::Dataset,
            center: CenterSource::Dataset,
            tuning,
        }
    }

    fn constant_of(node: &Node, arg: &str) -> serde_json::Value {
        node.argument(arg)
            .and_then(Node::as_constant)
            .cloned()
            .unwrap()
    }

    #[test]
    fn mask_compares_ndvi_greater_or_equal_to_threshold() {
        let params = AnalysisParams::default();
        let ndvi = Image::load("ndvi");
        let t = threshold(&params, &ndvi, &Geometry::point(0.0, 0.0));

        assert_eq!(t.mask.node().function_name(), Some("Image.gte"));
        assert_eq!(t.mask.node().argument("image1"), Some(ndvi.node()));

        let rhs = t.mask.node().argument("image2").unwrap();
        assert_eq!(rhs.function_name(), Some("Image.constant"));
        assert_eq!(rhs.argument("value"), Some(t.value.node()));
        assert_eq!(
            t.value.node().argument("key").and_then(Node::as_constant),
            Some(&serde_json::json!("NDVI"))
        );
    }

    #[test]
    fn percentile_constant_is_75() {
        assert_eq!(PERCENTILE, 75);

        let params = AnalysisParams::default();
        let t = threshold(&params, &Image::load("ndvi"), &Geometry::point(0.0, 0.0));
        let reducer = t.value.node().find_invocations("Reducer.percentile")[0];
        assert_eq!(
            reducer.argument("percentiles"),
            Some(&Node::array([Node::from(75_i64)]))
        );
    }

    #[test]
    fn ndvi_masks_water_before_band_math() {
        let params = AnalysisParams::default();
        let image = ndvi(&params, &Image::load("composite"));

        assert_eq!(image.node().function_name(), Some("Image.rename"));
        let masked = image.node().find_invocations("Image.mask");
        assert_eq!(masked.len(), 1);
        let mask = masked[0].argument("mask").unwrap();
        assert_eq!(mask.function_name(), Some("Image.not"));
        assert_eq!(mask.find_invocations("Image.eq").len(), 1);
    }

    #[test]
    fn default_label_uses_fixed_scale_and_no_offset() {
        let params = AnalysisParams::default();
        let city = dataset_city("Accra", CityOverride::default());
        let bounds = city_bounds(&params, &city);

        let label = urban_label(&params, &city, &bounds);

        assert_eq!(label.node().function_name(), Some("Number.round"));
        let reduce = label.node().find_invocations("Image.reduceRegion")[0];
        assert_eq!(constant_of(reduce, "scale"), serde_json::json!(2445.98));
    }

    #[test]
    fn overrides_change_offset_and_scale() {
        let params = AnalysisParams::default();

        let nyc = dataset_city(
            "NewYork",
            CityOverride {
                city: "NewYork".to_string(),
                mode_offset: 1,
                ..CityOverride::default()
            },
        );
        let label = urban_label(&params, &nyc, &city_bounds(&params, &nyc));
        assert_eq!(label.node().function_name(), Some("Number.add"));
        assert_eq!(constant_of(label.node(), "right"), serde_json::json!(1));

        let tokyo = dataset_city(
            "Tokyo",
            CityOverride {
                city: "Tokyo".to_string(),
                mode_scale: Some(ModeScale::Nominal),
                ..CityOverride::default()
            },
        );
        let label = urban_label(&params, &tokyo, &city_bounds(&params, &tokyo));
        let reduce = label.node().find_invocations("Image.reduceRegion")[0];
        assert_eq!(
            reduce.argument("scale").and_then(Node::function_name),
            Some("Projection.nominalScale")
        );
    }

    #[test]
    fn hand_drawn_region_is_the_literal_polygon() {
        let params = AnalysisParams::default();
        let city = ResolvedCity {
            name: "Belgaum".to_string(),
            hemisphere: Hemisphere::North,
            boundary: BoundarySource::HandDrawn {
                coordinates: vec![[74.46, 15.92], [74.46, 15.80], [74.56, 15.80], [74.56, 15.92]],
                properties: BTreeMap::from([("City".to_string(), serde_json::json!("Belgaum"))]),
            },
            center: CenterSource::Dataset,
            tuning: CityOverride::default(),
        };

        let bounds = city_bounds(&params, &city);
        let region = analysis_region(&params, &city, &bounds);

        assert!(region.node().find_invocations("Image.reduceToVectors").is_empty());
        assert_eq!(region.node().find_invocations("GeometryConstructors.Polygon").len(), 1);
        assert!(bounds.node().find_invocations("Collection.loadTable").is_empty());
    }

    #[test]
    fn dataset_region_is_polygonized_labels() {
        let params = AnalysisParams::default();
        let city = dataset_city("Accra", CityOverride::default());
        let bounds = city_bounds(&params, &city);

        let region = analysis_region(&params, &city, &bounds);

        let vectors = region.node().find_invocations("Image.reduceToVectors");
        assert_eq!(vectors.len(), 1);
        assert_eq!(constant_of(vectors[0], "geometryType"), serde_json::json!("polygon"));
        assert_eq!(
            bounds.node().argument("filter").and_then(|f| f.argument("rightValue")).and_then(Node::as_constant),
            Some(&serde_json::json!("Accra"))
        );
    }
}
