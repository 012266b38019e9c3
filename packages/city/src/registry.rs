//! City catalog, loaded from embedded TOML.
//!
//! Each file under `packages/city/catalog/` lists the cities of one
//! hemisphere and is baked into the binary via [`include_str!`].

use greenspace_city_models::{CatalogCity, Hemisphere};
use serde::Deserialize;

/// TOML catalogs embedded at compile time.
const CATALOG_TOMLS: &[(&str, &str)] = &[
    ("northern", include_str!("../catalog/northern.toml")),
    ("southern", include_str!("../catalog/southern.toml")),
];

/// Total number of catalog cities (used in tests).
#[cfg(test)]
const EXPECTED_CITY_COUNT: usize = 150;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    hemisphere: Hemisphere,
    cities: Vec<String>,
    #[serde(default)]
    hand_drawn_only: Vec<String>,
}

fn parse_catalog_toml(toml_str: &str) -> Result<Vec<CatalogCity>, toml::de::Error> {
    let file: CatalogFile = toml::from_str(toml_str)?;
    let hemisphere = file.hemisphere;

    let generic = file.cities.into_iter().map(|name| CatalogCity {
        name,
        hemisphere,
        requires_hand_drawn: false,
    });
    let small = file.hand_drawn_only.into_iter().map(|name| CatalogCity {
        name,
        hemisphere,
        requires_hand_drawn: true,
    });

    Ok(generic.chain(small).collect())
}

/// Returns every catalog city, northern hemisphere first, in file order.
///
/// # Panics
///
/// Panics if an embedded catalog is malformed.
#[must_use]
pub fn catalog() -> Vec<CatalogCity> {
    CATALOG_TOMLS
        .iter()
        .flat_map(|(name, toml)| {
            parse_catalog_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a catalog city by exact name.
#[must_use]
pub fn find<'a>(catalog: &'a [CatalogCity], name: &str) -> Option<&'a CatalogCity> {
    catalog.iter().find(|c| c.name == name)
}
