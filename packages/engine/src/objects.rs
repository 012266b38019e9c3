//! Typed handles for server-side objects.
//!
//! Each type wraps a [`Node`] and only offers the operations that make
//! sense for that kind of object, so an image can't be passed where a
//! geometry is expected. Method names follow the engine's algorithm
//! catalog (`Image.normalizedDifference`, `Geometry.buffer`, ...).

use crate::expr::Node;

macro_rules! deferred_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(Node);

        impl $name {
            /// Wraps an existing node that evaluates to this type.
            #[must_use]
            pub const fn from_node(node: Node) -> Self {
                Self(node)
            }

            /// Returns the underlying node.
            #[must_use]
            pub const fn node(&self) -> &Node {
                &self.0
            }
        }

        impl From<$name> for Node {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

deferred_type!(
    /// A single multi-band raster.
    Image
);
deferred_type!(
    /// A stack of images (e.g. a satellite archive).
    ImageCollection
);
deferred_type!(
    /// A vector geometry.
    Geometry
);
deferred_type!(
    /// A geometry with a property map.
    Feature
);
deferred_type!(
    /// A collection of features (a table).
    FeatureCollection
);
deferred_type!(
    /// A server-side number.
    Number
);
deferred_type!(
    /// A server-side string-keyed dictionary.
    Dictionary
);
deferred_type!(
    /// A predicate over collection elements.
    Filter
);
deferred_type!(
    /// An aggregation (sum, mode, percentile, ...).
    Reducer
);
deferred_type!(
    /// A coordinate reference system plus transform.
    Projection
);
deferred_type!(
    /// A half-open range of dates.
    DateRange
);

fn strings(items: &[&str]) -> Node {
    Node::array(items.iter().map(|s| Node::from(*s)))
}

/// Arguments for [`Image::reduce_region`].
#[derive(Debug, Clone)]
pub struct RegionReduction {
    /// Aggregation to apply.
    pub reducer: Reducer,
    /// Region to aggregate over.
    pub geometry: Geometry,
    /// Nominal scale in meters of the projection to work in.
    pub scale: Number,
    /// Maximum number of pixels to reduce.
    pub max_pixels: Option<u64>,
    /// Tile size multiplier (higher uses less memory per tile).
    pub tile_scale: Option<u32>,
}

#[allow(clippy::should_implement_trait)]
impl Image {
    /// Loads an image asset by id.
    #[must_use]
    pub fn load(id: &str) -> Self {
        Self(Node::invoke("Image.load", [("id", Node::from(id))]))
    }

    /// A constant single-band image.
    #[must_use]
    pub fn constant(value: impl Into<Number>) -> Self {
        Self(Node::invoke(
            "Image.constant",
            [("value", value.into().into())],
        ))
    }

    /// An image whose pixels hold their own area in square meters.
    #[must_use]
    pub fn pixel_area() -> Self {
        Self(Node::invoke("Image.pixelArea", []))
    }

    /// Selects bands by name.
    #[must_use]
    pub fn select(&self, bands: &[&str]) -> Self {
        Self(Node::invoke(
            "Image.select",
            [("input", self.0.clone()), ("bandSelectors", strings(bands))],
        ))
    }

    /// Per-pixel equality, producing a 0/1 image.
    #[must_use]
    pub fn eq(&self, other: &Self) -> Self {
        self.binary("Image.eq", other)
    }

    /// Per-pixel `>=`, producing a 0/1 image.
    #[must_use]
    pub fn gte(&self, other: &Self) -> Self {
        self.binary("Image.gte", other)
    }

    /// Per-pixel product.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        self.binary("Image.multiply", other)
    }

    fn binary(&self, function: &str, other: &Self) -> Self {
        Self(Node::invoke(
            function,
            [("image1", self.0.clone()), ("image2", other.0.clone())],
        ))
    }

    /// Per-pixel logical negation.
    #[must_use]
    pub fn not(&self) -> Self {
        Self(Node::invoke("Image.not", [("value", self.0.clone())]))
    }

    /// Replaces this image's mask with `mask`.
    #[must_use]
    pub fn mask(&self, mask: &Self) -> Self {
        Self(Node::invoke(
            "Image.mask",
            [("image", self.0.clone()), ("mask", mask.0.clone())],
        ))
    }

    /// Masks every pixel whose value is zero.
    #[must_use]
    pub fn self_mask(&self) -> Self {
        Self(Node::invoke("Image.selfMask", [("image", self.0.clone())]))
    }

    /// `(first - second) / (first + second)` over two named bands.
    #[must_use]
    pub fn normalized_difference(&self, first: &str, second: &str) -> Self {
        Self(Node::invoke(
            "Image.normalizedDifference",
            [
                ("input", self.0.clone()),
                ("bandNames", strings(&[first, second])),
            ],
        ))
    }

    /// Renames bands.
    #[must_use]
    pub fn rename(&self, names: &[&str]) -> Self {
        Self(Node::invoke(
            "Image.rename",
            [("input", self.0.clone()), ("names", strings(names))],
        ))
    }

    /// Clips to a geometry.
    #[must_use]
    pub fn clip(&self, geometry: &Geometry) -> Self {
        Self(Node::invoke(
            "Image.clip",
            [("input", self.0.clone()), ("geometry", geometry.0.clone())],
        ))
    }

    /// Casts to unsigned 8-bit.
    #[must_use]
    pub fn to_byte(&self) -> Self {
        Self(Node::invoke("Image.toByte", [("value", self.0.clone())]))
    }

    /// Burns the features into the image with a fixed value.
    #[must_use]
    pub fn paint(&self, features: &FeatureCollection, color: f64) -> Self {
        Self(Node::invoke(
            "Image.paint",
            [
                ("image", self.0.clone()),
                ("featureCollection", features.0.clone()),
                ("color", Node::from(color)),
            ],
        ))
    }

    /// Accumulated traversal cost from the non-zero pixels of `source`
    /// across this cost surface. Output band: `cumulative_cost`.
    #[must_use]
    pub fn cumulative_cost(&self, source: &Self, max_distance: f64) -> Self {
        Self(Node::invoke(
            "Image.cumulativeCost",
            [
                ("image", self.0.clone()),
                ("source", source.0.clone()),
                ("maxDistance", Node::from(max_distance)),
            ],
        ))
    }

    /// Aggregates pixels inside a region into a dictionary keyed by band.
    #[must_use]
    pub fn reduce_region(&self, args: RegionReduction) -> Dictionary {
        let mut arguments = vec![
            ("image", self.0.clone()),
            ("reducer", args.reducer.0),
            ("geometry", args.geometry.0),
            ("scale", args.scale.0),
        ];
        if let Some(max_pixels) = args.max_pixels {
            #[allow(clippy::cast_precision_loss)]
            let max_pixels = max_pixels as f64;
            arguments.push(("maxPixels", Node::from(max_pixels)));
        }
        if let Some(tile_scale) = args.tile_scale {
            arguments.push(("tileScale", Node::from(f64::from(tile_scale))));
        }
        Dictionary(Node::invoke("Image.reduceRegion", arguments))
    }

    /// Converts connected runs of equal pixels into polygons.
    #[must_use]
    pub fn reduce_to_vectors(
        &self,
        reducer: &Reducer,
        geometry: &Geometry,
        scale: &Number,
        geometry_type: &str,
    ) -> FeatureCollection {
        FeatureCollection(Node::invoke(
            "Image.reduceToVectors",
            [
                ("image", self.0.clone()),
                ("reducer", reducer.0.clone()),
                ("geometry", geometry.0.clone()),
                ("scale", scale.0.clone()),
                ("geometryType", Node::from(geometry_type)),
            ],
        ))
    }

    /// The image's default projection.
    #[must_use]
    pub fn projection(&self) -> Projection {
        Projection(Node::invoke("Image.projection", [("image", self.0.clone())]))
    }

    /// Forces evaluation in `projection`.
    #[must_use]
    pub fn reproject(&self, projection: &Projection) -> Self {
        Self(Node::invoke(
            "Image.reproject",
            [("image", self.0.clone()), ("crs", projection.0.clone())],
        ))
    }

    /// Clips to the geometry's bounds and resamples at `scale` meters.
    #[must_use]
    pub fn clip_to_bounds_and_scale(&self, geometry: &Geometry, scale: f64) -> Self {
        Self(Node::invoke(
            "Image.clipToBoundsAndScale",
            [
                ("input", self.0.clone()),
                ("geometry", geometry.0.clone()),
                ("scale", Node::from(scale)),
            ],
        ))
    }
}

impl ImageCollection {
    /// Loads an image collection asset by id.
    #[must_use]
    pub fn load(id: &str) -> Self {
        Self(Node::invoke("ImageCollection.load", [("id", Node::from(id))]))
    }

    /// Keeps elements matching `filter`.
    #[must_use]
    pub fn filter(&self, filter: &Filter) -> Self {
        Self(filter_collection(&self.0, filter))
    }

    /// Keeps images whose acquisition time falls in `range`.
    #[must_use]
    pub fn filter_date(&self, range: &DateRange) -> Self {
        self.filter(&Filter::date_range(range))
    }

    /// Flattens the stack, later images on top.
    #[must_use]
    pub fn mosaic(&self) -> Image {
        Image(Node::invoke(
            "ImageCollection.mosaic",
            [("collection", self.0.clone())],
        ))
    }

    /// Number of images.
    #[must_use]
    pub fn size(&self) -> Number {
        Number(Node::invoke("Collection.size", [("collection", self.0.clone())]))
    }

    /// Cloud-reduced Landsat composite (TOA calibration, cloud scoring
    /// and per-pixel selection all happen server-side).
    #[must_use]
    pub fn landsat_simple_composite(
        &self,
        cloud_score_range: u32,
        max_depth: u32,
        as_float: bool,
    ) -> Image {
        Image(Node::invoke(
            "Landsat.simpleComposite",
            [
                ("collection", self.0.clone()),
                ("cloudScoreRange", Node::from(i64::from(cloud_score_range))),
                ("maxDepth", Node::from(i64::from(max_depth))),
                ("asFloat", Node::from(as_float)),
            ],
        ))
    }
}

impl Geometry {
    /// A point from `[longitude, latitude]`.
    #[must_use]
    pub fn point(lon: f64, lat: f64) -> Self {
        Self(Node::invoke(
            "GeometryConstructors.Point",
            [(
                "coordinates",
                Node::array([Node::from(lon), Node::from(lat)]),
            )],
        ))
    }

    /// A planar (non-geodesic) polygon from a single exterior ring of
    /// `[longitude, latitude]` pairs.
    #[must_use]
    pub fn polygon(ring: &[[f64; 2]]) -> Self {
        let ring = Node::array(
            ring.iter()
                .map(|[lon, lat]| Node::array([Node::from(*lon), Node::from(*lat)])),
        );
        Self(Node::invoke(
            "GeometryConstructors.Polygon",
            [
                ("coordinates", Node::array([ring])),
                ("geodesic", Node::from(false)),
            ],
        ))
    }

    /// Bounding rectangle.
    #[must_use]
    pub fn bounds(&self) -> Self {
        Self(Node::invoke("Geometry.bounds", [("geometry", self.0.clone())]))
    }

    /// Buffers by `distance` meters.
    #[must_use]
    pub fn buffer(&self, distance: &Number) -> Self {
        Self(Node::invoke(
            "Geometry.buffer",
            [("geometry", self.0.clone()), ("distance", distance.0.clone())],
        ))
    }

    /// Perimeter in meters.
    #[must_use]
    pub fn perimeter(&self, max_error: f64) -> Number {
        Number(Node::invoke(
            "Geometry.perimeter",
            [
                ("geometry", self.0.clone()),
                ("maxError", error_margin(max_error)),
            ],
        ))
    }

    /// Area in square meters.
    #[must_use]
    pub fn area(&self, max_error: f64) -> Number {
        Number(Node::invoke(
            "Geometry.area",
            [
                ("geometry", self.0.clone()),
                ("maxError", error_margin(max_error)),
            ],
        ))
    }
}

fn error_margin(meters: f64) -> Node {
    Node::invoke("ErrorMargin", [("value", Node::from(meters))])
}

impl Feature {
    /// A feature from an optional geometry and properties.
    #[must_use]
    pub fn new<'a>(
        geometry: Option<&Geometry>,
        properties: impl IntoIterator<Item = (&'a str, Node)>,
    ) -> Self {
        Self(Node::invoke(
            "Feature",
            [
                ("geometry", geometry.map_or_else(Node::null, |g| g.0.clone())),
                ("metadata", Node::dictionary(properties)),
            ],
        ))
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn set(&self, key: &str, value: impl Into<Node>) -> Self {
        Self(Node::invoke(
            "Element.set",
            [
                ("object", self.0.clone()),
                ("key", Node::from(key)),
                ("value", value.into()),
            ],
        ))
    }

    /// Returns a copy with its geometry replaced (`None` drops it).
    #[must_use]
    pub fn set_geometry(&self, geometry: Option<&Geometry>) -> Self {
        Self(Node::invoke(
            "Feature.setGeometry",
            [
                ("feature", self.0.clone()),
                ("geometry", geometry.map_or_else(Node::null, |g| g.0.clone())),
            ],
        ))
    }
}

impl FeatureCollection {
    /// Loads a table asset by id.
    #[must_use]
    pub fn load(table_id: &str) -> Self {
        Self(Node::invoke(
            "Collection.loadTable",
            [("tableId", Node::from(table_id))],
        ))
    }

    /// A collection from literal features.
    #[must_use]
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        Self(Node::invoke(
            "Collection",
            [("features", Node::array(features.into_iter().map(|f| f.0)))],
        ))
    }

    /// Keeps elements matching `filter`.
    #[must_use]
    pub fn filter(&self, filter: &Filter) -> Self {
        Self(filter_collection(&self.0, filter))
    }

    /// Union of all member geometries.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry(Node::invoke(
            "Collection.geometry",
            [("collection", self.0.clone())],
        ))
    }

    /// The first feature.
    #[must_use]
    pub fn first(&self) -> Feature {
        Feature(Node::invoke("Collection.first", [("collection", self.0.clone())]))
    }

    /// Number of features.
    #[must_use]
    pub fn size(&self) -> Number {
        Number(Node::invoke("Collection.size", [("collection", self.0.clone())]))
    }
}

fn filter_collection(collection: &Node, filter: &Filter) -> Node {
    Node::invoke(
        "Collection.filter",
        [("collection", collection.clone()), ("filter", filter.0.clone())],
    )
}

#[allow(clippy::should_implement_trait)]
impl Number {
    /// Rounds to the nearest integer.
    #[must_use]
    pub fn round(&self) -> Self {
        Self(Node::invoke("Number.round", [("input", self.0.clone())]))
    }

    /// `self + other`.
    #[must_use]
    pub fn add(&self, other: impl Into<Self>) -> Self {
        self.binary("Number.add", other.into())
    }

    /// `self / other`.
    #[must_use]
    pub fn divide(&self, other: impl Into<Self>) -> Self {
        self.binary("Number.divide", other.into())
    }

    fn binary(&self, function: &str, other: Self) -> Self {
        Self(Node::invoke(
            function,
            [("left", self.0.clone()), ("right", other.0)],
        ))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self(Node::from(value))
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self(Node::from(value))
    }
}

impl Dictionary {
    /// Looks up `key`. The engine fails the whole expression if the key
    /// is absent, so callers probe emptiness before relying on it.
    #[must_use]
    pub fn get(&self, key: &str) -> Number {
        Number(Node::invoke(
            "Dictionary.get",
            [("dictionary", self.0.clone()), ("key", Node::from(key))],
        ))
    }
}

impl Filter {
    /// `element[field] == value`.
    #[must_use]
    pub fn equals(field: &str, value: impl Into<Node>) -> Self {
        Self(Node::invoke(
            "Filter.equals",
            [("leftField", Node::from(field)), ("rightValue", value.into())],
        ))
    }

    /// Acquisition day-of-year in `start..=end`, with `start <= end`.
    #[must_use]
    pub fn day_of_year(start: u16, end: u16) -> Self {
        Self(Node::invoke(
            "Filter.dayOfYear",
            [
                ("start", Node::from(i64::from(start))),
                ("end", Node::from(i64::from(end))),
            ],
        ))
    }

    /// Matches if any of `filters` matches.
    #[must_use]
    pub fn or(filters: impl IntoIterator<Item = Self>) -> Self {
        Self(Node::invoke(
            "Filter.or",
            [("filters", Node::array(filters.into_iter().map(|f| f.0)))],
        ))
    }

    /// Acquisition time (`system:time_start`) inside `range`.
    #[must_use]
    pub fn date_range(range: &DateRange) -> Self {
        Self(Node::invoke(
            "Filter.dateRangeContains",
            [
                ("leftValue", range.0.clone()),
                ("rightField", Node::from("system:time_start")),
            ],
        ))
    }
}

impl Reducer {
    /// Most frequent value.
    #[must_use]
    pub fn mode() -> Self {
        Self(Node::invoke("Reducer.mode", []))
    }

    /// Maximum value.
    #[must_use]
    pub fn max() -> Self {
        Self(Node::invoke("Reducer.max", []))
    }

    /// Sum of values.
    #[must_use]
    pub fn sum() -> Self {
        Self(Node::invoke("Reducer.sum", []))
    }

    /// Count of all pixels, masked or not.
    #[must_use]
    pub fn count_every() -> Self {
        Self(Node::invoke("Reducer.countEvery", []))
    }

    /// The given percentiles (0-100). Output keys are the band name for a
    /// single percentile.
    #[must_use]
    pub fn percentile(percentiles: &[u8]) -> Self {
        Self(Node::invoke(
            "Reducer.percentile",
            [(
                "percentiles",
                Node::array(percentiles.iter().map(|p| Node::from(i64::from(*p)))),
            )],
        ))
    }
}

impl Projection {
    /// A projection from a CRS code such as `"EPSG:3395"`.
    #[must_use]
    pub fn new(crs: &str) -> Self {
        Self(Node::invoke("Projection", [("crs", Node::from(crs))]))
    }

    /// Same CRS with the nominal scale set to `meters`.
    #[must_use]
    pub fn at_scale(&self, meters: f64) -> Self {
        Self(Node::invoke(
            "Projection.atScale",
            [("projection", self.0.clone()), ("meters", Node::from(meters))],
        ))
    }

    /// Linear size of one pixel, in meters.
    #[must_use]
    pub fn nominal_scale(&self) -> Number {
        Number(Node::invoke(
            "Projection.nominalScale",
            [("proj", self.0.clone())],
        ))
    }
}

impl DateRange {
    /// `[start, end)` from ISO dates (`YYYY-MM-DD`).
    #[must_use]
    pub fn new(start: &str, end: &str) -> Self {
        Self(Node::invoke(
            "DateRange",
            [("start", Node::from(start)), ("end", Node::from(end))],
        ))
    }
}
