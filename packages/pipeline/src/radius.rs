//! Search radius and export circle.
//!
//! Dataset cities use the cost-distance radius: the city center is burned
//! into a raster as the only source, a uniform cost surface covering the
//! urban polygon's bounding box is accumulated from it, and the largest
//! accumulated cost inside the polygon is the radius. Hand-drawn cities
//! use a fifth of the boundary perimeter. Either way the export circle is
//! the center buffered by the radius.

use geo::{Distance, Haversine, MultiPolygon, Point};
use greenspace_city_models::{CenterSource, ResolvedCity};
use greenspace_engine::objects::{
    Feature, FeatureCollection, Filter, Geometry, Image, Number, Reducer, RegionReduction,
};

use crate::params::AnalysisParams;

/// Hand-drawn cities: radius = perimeter / this.
pub const FALLBACK_RADIUS_DIVISOR: f64 = 5.0;

/// Output band of `Image.cumulativeCost`.
const COST_BAND: &str = "cumulative_cost";

/// The city center.
#[must_use]
pub fn center(params: &AnalysisParams, city: &ResolvedCity) -> Geometry {
    match city.center {
        CenterSource::Dataset => FeatureCollection::load(&params.datasets.centers)
            .filter(&Filter::equals(&params.datasets.city_key, city.name.as_str()))
            .geometry(),
        CenterSource::Literal { lon, lat } => Geometry::point(lon, lat),
    }
}

/// Radius plus the circle it defines.
#[derive(Debug, Clone)]
pub struct SearchCircle {
    /// Radius in meters.
    pub radius: Number,
    /// Center buffered by `radius`.
    pub circle: Geometry,
}

/// Cost-distance radius over `polygon`.
#[must_use]
pub fn cost_distance(
    params: &AnalysisParams,
    city: &ResolvedCity,
    center: &Geometry,
    polygon: &Geometry,
) -> SearchCircle {
    let max_distance = city
        .tuning
        .cost_max_distance_m
        .unwrap_or_else(|| params.radius.max_distance_m(city.hemisphere));

    let source = Image::constant(0_i64)
        .mask(&Image::constant(0_i64))
        .to_byte()
        .paint(
            &FeatureCollection::from_features([Feature::new(Some(center), [])]),
            1.0,
        );

    let cost = Image::constant(1_i64)
        .clip(&polygon.bounds())
        .cumulative_cost(&source, max_distance);

    let radius = cost
        .clip(polygon)
        .select(&[COST_BAND])
        .reduce_region(RegionReduction {
            reducer: Reducer::max(),
            geometry: polygon.clone(),
            scale: Number::from(params.radius.max_scale_m),
            max_pixels: None,
            tile_scale: None,
        })
        .get(COST_BAND);

    let circle = center.buffer(&radius);
    SearchCircle { radius, circle }
}

/// Perimeter-based radius for a hand-drawn `boundary`.
#[must_use]
pub fn perimeter_fraction(
    params: &AnalysisParams,
    center: &Geometry,
    boundary: &Geometry,
) -> SearchCircle {
    let radius = boundary
        .perimeter(params.radius.perimeter_max_error_m)
        .divide(FALLBACK_RADIUS_DIVISOR);
    let circle = center.buffer(&radius);
    SearchCircle { radius, circle }
}

/// Local counterpart of [`perimeter_fraction`].
#[must_use]
pub fn fallback_radius_m(perimeter_m: f64) -> f64 {
    perimeter_m / FALLBACK_RADIUS_DIVISOR
}

/// Geodesic perimeter of a closed ring of `[lon, lat]` pairs, in meters.
#[must_use]
pub fn ring_perimeter_m(ring: &[[f64; 2]]) -> f64 {
    if ring.len() < 2 {
        return 0.0;
    }
    let closing = (ring[ring.len() - 1], ring[0]);
    ring.windows(2)
        .map(|w| (w[0], w[1]))
        .chain(std::iter::once(closing))
        .map(|([x1, y1], [x2, y2])| Haversine.distance(Point::new(x1, y1), Point::new(x2, y2)))
        .sum()
}

/// Whether every exterior vertex of `region` lies within `radius_m` of
/// `center`, allowing a 0.1% overshoot for the raster resolution of the
/// cost surface.
///
/// This is an approximation of strict containment: vertices are checked
/// with the tolerance, edges between them and interior rings are not.
/// Preflight only logs a warning when it fails.
#[must_use]
pub fn circle_contains(center: Point<f64>, radius_m: f64, region: &MultiPolygon<f64>) -> bool {
    let tolerance = radius_m * 1e-3;
    region
        .0
        .iter()
        .flat_map(|polygon| polygon.exterior().points())
        .all(|vertex| Haversine.distance(center, vertex) <= radius_m + tolerance)
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};
    use greenspace_city_models::{BoundarySource, CityOverride, Hemisphere};
    use greenspace_engine::Node;

    use super::*;

    fn city(hemisphere: Hemisphere, tuning: CityOverride) -> ResolvedCity {
        ResolvedCity {
            name: "Accra".to_string(),
            hemisphere,
            boundary: BoundarySource::Dataset,
            center: CenterSource::Dataset,
            tuning,
        }
    }

    fn max_distance(circle: &SearchCircle) -> serde_json::Value {
        circle.circle.node().find_invocations("Image.cumulativeCost")[0]
            .argument("maxDistance")
            .and_then(Node::as_constant)
            .cloned()
            .unwrap()
    }

    #[test]
    fn fallback_radius_is_a_fifth_of_the_perimeter() {
        assert!((fallback_radius_m(10_000.0) - 2_000.0).abs() < f64::EPSILON);

        let params = AnalysisParams::default();
        let circle = perimeter_fraction(
            &params,
            &Geometry::point(0.0, 0.0),
            &Geometry::polygon(&[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.01, 0.0]]),
        );

        assert_eq!(circle.radius.node().function_name(), Some("Number.divide"));
        assert_eq!(
            circle.radius.node().argument("right").and_then(Node::as_constant),
            Some(&serde_json::json!(5.0))
        );
        assert_eq!(circle.circle.node().function_name(), Some("Geometry.buffer"));
    }

    #[test]
    fn cost_cap_follows_hemisphere_and_override() {
        let params = AnalysisParams::default();
        let center = Geometry::point(0.0, 5.6);
        let polygon = Geometry::polygon(&[[0.0, 5.5], [0.0, 5.7], [0.2, 5.7], [0.2, 5.5]]);

        let north = cost_distance(&params, &city(Hemisphere::North, CityOverride::default()), &center, &polygon);
        assert_eq!(max_distance(&north), serde_json::json!(500_000.0));

        let south = cost_distance(&params, &city(Hemisphere::South, CityOverride::default()), &center, &polygon);
        assert_eq!(max_distance(&south), serde_json::json!(100_000.0));

        let capped = cost_distance(
            &params,
            &city(
                Hemisphere::North,
                CityOverride {
                    cost_max_distance_m: Some(250_000.0),
                    ..CityOverride::default()
                },
            ),
            &center,
            &polygon,
        );
        assert_eq!(max_distance(&capped), serde_json::json!(250_000.0));
    }

    #[test]
    fn cost_radius_is_max_over_the_polygon() {
        let params = AnalysisParams::default();
        let polygon = Geometry::polygon(&[[0.0, 5.5], [0.0, 5.7], [0.2, 5.7], [0.2, 5.5]]);
        let circle = cost_distance(
            &params,
            &city(Hemisphere::North, CityOverride::default()),
            &Geometry::point(0.1, 5.6),
            &polygon,
        );

        let reduce = circle.radius.node().find_invocations("Image.reduceRegion")[0];
        assert_eq!(
            reduce.argument("reducer").and_then(Node::function_name),
            Some("Reducer.max")
        );
        assert_eq!(reduce.argument("geometry"), Some(polygon.node()));
        assert_eq!(circle.circle.node().find_invocations("Geometry.bounds").len(), 1);
    }

    #[test]
    fn ring_perimeter_matches_haversine_sides() {
        // ~1.11 km per 0.01 degree at the equator.
        let ring = [[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.01, 0.0]];
        let perimeter = ring_perimeter_m(&ring);
        assert!((perimeter - 4_447.8).abs() < 5.0, "{perimeter}");
        assert!((fallback_radius_m(perimeter) - perimeter / 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn circle_containment() {
        let square = MultiPolygon(vec![Polygon::new(
            LineString::from(vec![(-0.01, -0.01), (-0.01, 0.01), (0.01, 0.01), (0.01, -0.01)]),
            vec![],
        )]);
        let center = Point::new(0.0, 0.0);

        // Corner is ~1.57 km from the center.
        assert!(circle_contains(center, 1_600.0, &square));
        assert!(!circle_contains(center, 1_000.0, &square));
    }

    #[test]
    fn circle_containment_allows_small_overshoot() {
        let square = MultiPolygon(vec![Polygon::new(
            LineString::from(vec![(-0.01, -0.01), (-0.01, 0.01), (0.01, 0.01), (0.01, -0.01)]),
            vec![],
        )]);
        let center = Point::new(0.0, 0.0);
        let corner = Haversine.distance(center, Point::new(0.01, 0.01));

        // Corner ~0.5 m outside the radius, inside the 0.1% tolerance.
        assert!(circle_contains(center, corner - 0.5, &square));
        // ~2.5 m outside, beyond the tolerance.
        assert!(!circle_contains(center, corner - 2.5, &square));
    }
}
