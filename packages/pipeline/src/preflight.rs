//! Synchronous probes run before a city's exports are submitted.
//!
//! Two small `value:compute` calls catch the failures that would
//! otherwise only surface hours later as failed export tasks: an empty
//! seasonal collection, and an analysis polygon or radius that does not
//! evaluate to anything usable.

use geo::{MultiPolygon, Point};
use geojson::GeoJson;
use greenspace_engine::{EngineApi, Node, compute_as};
use serde::Deserialize;

use crate::city::{CityFailure, CityProducts};
use crate::params::AnalysisParams;
use crate::radius::{circle_contains, fallback_radius_m, ring_perimeter_m};

/// Relative difference between the remote and local hand-drawn radius
/// above which a warning is logged.
const FALLBACK_RADIUS_TOLERANCE: f64 = 0.05;

/// Evaluated geometry of one city.
#[derive(Debug, Clone, Deserialize)]
pub struct GeometryProbe {
    /// Area of the analysis region in square meters.
    pub area: Option<f64>,
    /// Search radius in meters.
    pub radius: Option<f64>,
    /// Center as GeoJSON.
    pub center: Option<serde_json::Value>,
    /// Analysis region as GeoJSON.
    pub region: Option<serde_json::Value>,
}

/// Runs both probes for `products`.
///
/// # Errors
///
/// Returns [`CityFailure::NoImagery`] if the seasonal collection is empty
/// or cannot be evaluated, and [`CityFailure::DegenerateGeometry`] if the
/// region, center or radius is missing or not positive.
pub async fn check(
    engine: &dyn EngineApi,
    params: &AnalysisParams,
    products: &CityProducts,
) -> Result<GeometryProbe, CityFailure> {
    let scenes = count_scenes(engine, products).await?;
    log::debug!("{}: {scenes} seasonal scenes", products.city);

    let probe = probe_geometry(engine, params, products).await?;
    check_radius(products, &probe);
    Ok(probe)
}

async fn count_scenes(engine: &dyn EngineApi, products: &CityProducts) -> Result<u64, CityFailure> {
    let size: Option<u64> = compute_as(engine, products.imagery.size().node())
        .await
        .map_err(|e| CityFailure::NoImagery {
            message: e.to_string(),
        })?;

    match size {
        Some(n) if n > 0 => Ok(n),
        _ => Err(CityFailure::NoImagery {
            message: "seasonal collection is empty".to_string(),
        }),
    }
}

async fn probe_geometry(
    engine: &dyn EngineApi,
    params: &AnalysisParams,
    products: &CityProducts,
) -> Result<GeometryProbe, CityFailure> {
    let degenerate = |message: String| CityFailure::DegenerateGeometry { message };

    let request = Node::dictionary([
        (
            "area",
            products
                .region
                .area(params.radius.perimeter_max_error_m)
                .node()
                .clone(),
        ),
        ("radius", products.circle.radius.node().clone()),
        ("center", products.center.node().clone()),
        ("region", products.region.node().clone()),
    ]);

    let probe: Option<GeometryProbe> = compute_as(engine, &request)
        .await
        .map_err(|e| degenerate(e.to_string()))?;
    let probe = probe.ok_or_else(|| degenerate("geometry probe returned null".to_string()))?;

    let center_missing = matches!(probe.center, None | Some(serde_json::Value::Null));
    match (probe.area, probe.radius) {
        (Some(area), _) if area <= 0.0 => {
            Err(degenerate(format!("analysis region has area {area}")))
        }
        (None, _) => Err(degenerate("analysis region has no area".to_string())),
        (_, Some(radius)) if radius <= 0.0 || !radius.is_finite() => {
            Err(degenerate(format!("search radius is {radius}")))
        }
        (_, None) => Err(degenerate("search radius did not evaluate".to_string())),
        _ if center_missing => Err(degenerate("city center is missing".to_string())),
        _ => Ok(probe),
    }
}

/// Compares the evaluated radius with what the city's policy implies,
/// logging a warning on mismatch.
fn check_radius(products: &CityProducts, probe: &GeometryProbe) {
    let Some(radius) = probe.radius else {
        return;
    };

    if let Some(ring) = &products.hand_drawn_ring {
        let expected = fallback_radius_m(ring_perimeter_m(ring));
        if expected > 0.0 && ((radius - expected) / expected).abs() > FALLBACK_RADIUS_TOLERANCE {
            log::warn!(
                "{}: radius {radius:.0} m differs from local perimeter estimate {expected:.0} m",
                products.city
            );
        }
        return;
    }

    let center = probe.center.as_ref().and_then(parse_point);
    let region = probe.region.as_ref().and_then(parse_multipolygon);
    match (center, region) {
        (Some(center), Some(region)) => {
            if !circle_contains(center, radius, &region) {
                log::warn!(
                    "{}: search circle of {radius:.0} m does not cover the urban polygon",
                    products.city
                );
            }
        }
        _ => log::debug!("{}: skipping local circle check", products.city),
    }
}

fn parse_geometry(value: &serde_json::Value) -> Option<geo::Geometry<f64>> {
    let geojson = GeoJson::from_json_value(value.clone()).ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        geom.try_into().ok()
    } else {
        None
    }
}

/// Parses a GeoJSON point (or the first point of a multipoint).
#[must_use]
pub fn parse_point(value: &serde_json::Value) -> Option<Point<f64>> {
    match parse_geometry(value)? {
        geo::Geometry::Point(p) => Some(p),
        geo::Geometry::MultiPoint(mp) => mp.0.first().copied(),
        _ => None,
    }
}

/// Parses a GeoJSON polygon, multipolygon or collection of polygons.
#[must_use]
pub fn parse_multipolygon(value: &serde_json::Value) -> Option<MultiPolygon<f64>> {
    fn polygons(geometry: geo::Geometry<f64>, out: &mut Vec<geo::Polygon<f64>>) {
        match geometry {
            geo::Geometry::Polygon(p) => out.push(p),
            geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
            geo::Geometry::GeometryCollection(gc) => {
                for g in gc.0 {
                    polygons(g, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    polygons(parse_geometry(value)?, &mut out);
    if out.is_empty() {
        None
    } else {
        Some(MultiPolygon(out))
    }
}

#[cfg(test)]
mod tests {
    use greenspace_city_models::{
        BoundarySource, CenterSource, CityOverride, Hemisphere, ResolvedCity,
    };
    use greenspace_engine::EngineError;
    use greenspace_engine::recording::RecordingEngine;
    use greenspace_engine_models::{Expression, ValueNode};
    use serde_json::json;

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

    fn root_function(expression: &Expression) -> Option<&str> {
        match &expression.values[&expression.result] {
            ValueNode::FunctionInvocationValue { function_name, .. } => Some(function_name),
            _ => None,
        }
    }

    fn square(half: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[-half, -half], [-half, half], [half, half], [half, -half], [-half, -half]]]
        })
    }

    fn engine(scenes: serde_json::Value, geometry: serde_json::Value) -> RecordingEngine {
        RecordingEngine::new().with_responder(move |expression| {
            if root_function(expression) == Some("Collection.size") {
                Ok(scenes.clone())
            } else {
                Ok(geometry.clone())
            }
        })
    }

    fn healthy_geometry() -> serde_json::Value {
        json!({
            "area": 4.9e6,
            "radius": 1_600.0,
            "center": {"type": "Point", "coordinates": [0.0, 0.0]},
            "region": square(0.01),
        })
    }

    #[tokio::test]
    async fn healthy_city_passes() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());
        let engine = engine(json!(12), healthy_geometry());

        let probe = check(&engine, &params, &products).await.unwrap();
        assert_eq!(probe.radius, Some(1_600.0));
        assert_eq!(engine.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_collection_is_no_imagery() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());
        let engine = engine(json!(0), healthy_geometry());

        let err = check(&engine, &params, &products).await.unwrap_err();
        assert!(matches!(err, CityFailure::NoImagery { .. }), "{err:?}");
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn evaluation_error_is_no_imagery() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());
        let engine = RecordingEngine::new().with_responder(|_| {
            Err(EngineError::Api {
                status: 400,
                message: "INVALID_ARGUMENT: Collection.size: empty".to_string(),
            })
        });

        let err = check(&engine, &params, &products).await.unwrap_err();
        assert!(matches!(err, CityFailure::NoImagery { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn zero_area_is_degenerate() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());
        let mut geometry = healthy_geometry();
        geometry["area"] = json!(0.0);

        let err = check(&engine(json!(5), geometry), &params, &products)
            .await
            .unwrap_err();
        assert!(matches!(err, CityFailure::DegenerateGeometry { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_center_or_radius_is_degenerate() {
        let params = AnalysisParams::default();
        let products = build_products(&params, &accra());

        let mut no_center = healthy_geometry();
        no_center["center"] = serde_json::Value::Null;
        let err = check(&engine(json!(5), no_center), &params, &products)
            .await
            .unwrap_err();
        assert!(matches!(err, CityFailure::DegenerateGeometry { .. }));

        let mut no_radius = healthy_geometry();
        no_radius["radius"] = serde_json::Value::Null;
        let err = check(&engine(json!(5), no_radius), &params, &products)
            .await
            .unwrap_err();
        assert!(matches!(err, CityFailure::DegenerateGeometry { .. }));
    }

    #[test]
    fn parses_engine_geojson() {
        assert_eq!(
            parse_point(&json!({"type": "Point", "coordinates": [1.5, 2.5]})),
            Some(Point::new(1.5, 2.5))
        );
        assert_eq!(parse_multipolygon(&square(0.01)).map(|mp| mp.0.len()), Some(1));

        let collection = json!({
            "type": "GeometryCollection",
            "geometries": [square(0.01), {"type": "Point", "coordinates": [0.0, 0.0]}, square(0.02)]
        });
        assert_eq!(parse_multipolygon(&collection).map(|mp| mp.0.len()), Some(2));
        assert!(parse_multipolygon(&json!({"type": "Point", "coordinates": [0.0, 0.0]})).is_none());
    }
}
