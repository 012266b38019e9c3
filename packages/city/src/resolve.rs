//! Turns a hemisphere and a list of city names into [`ResolvedCity`]s.

use std::collections::BTreeSet;

use greenspace_city_models::{
    BoundarySource, CatalogCity, CenterSource, CityOverride, Hemisphere, OverrideFile,
    ResolvedCity,
};

use crate::{CityConfigError, registry};

/// Resolves the cities for one run.
///
/// With an empty `names`, every catalog city of `hemisphere` is selected,
/// except hand-drawn-only cities that have no boundary in `overrides`
/// (those are skipped with a warning). Explicitly named cities must exist,
/// belong to `hemisphere`, appear once, and have a boundary if they need
/// one.
///
/// Overrides and hand-drawn boundaries must name catalog cities of some
/// hemisphere; entries for the other hemisphere are ignored.
///
/// # Errors
///
/// Returns the first [`CityConfigError`] found.
pub fn select(
    catalog: &[CatalogCity],
    overrides: &OverrideFile,
    hemisphere: Hemisphere,
    names: &[String],
) -> Result<Vec<ResolvedCity>, CityConfigError> {
    check_override_cities(catalog, overrides)?;

    if names.is_empty() {
        let mut resolved = Vec::new();
        for city in catalog.iter().filter(|c| c.hemisphere == hemisphere) {
            match resolve_one(city, overrides) {
                Ok(r) => resolved.push(r),
                Err(CityConfigError::MissingHandDrawn { name }) => {
                    log::warn!("Skipping {name}: no hand-drawn boundary configured");
                }
                Err(e) => return Err(e),
            }
        }
        return Ok(resolved);
    }

    let mut seen = BTreeSet::new();
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            if !seen.insert(name) {
                return Err(CityConfigError::DuplicateCity {
                    name: name.to_string(),
                });
            }
            let city = registry::find(catalog, name).ok_or_else(|| {
                CityConfigError::UnknownCity {
                    name: name.to_string(),
                }
            })?;
            if city.hemisphere != hemisphere {
                return Err(CityConfigError::HemisphereMismatch {
                    name: city.name.clone(),
                    expected: hemisphere,
                    actual: city.hemisphere,
                });
            }
            resolve_one(city, overrides)
        })
        .collect()
}

fn check_override_cities(
    catalog: &[CatalogCity],
    overrides: &OverrideFile,
) -> Result<(), CityConfigError> {
    let configured = overrides
        .overrides
        .iter()
        .map(|o| &o.city)
        .chain(overrides.hand_drawn.iter().map(|h| &h.city));

    for name in configured {
        if registry::find(catalog, name).is_none() {
            return Err(CityConfigError::UnknownCity { name: name.clone() });
        }
    }
    Ok(())
}

fn resolve_one(
    city: &CatalogCity,
    overrides: &OverrideFile,
) -> Result<ResolvedCity, CityConfigError> {
    let hand_drawn = overrides.hand_drawn.iter().find(|h| h.city == city.name);
    if city.requires_hand_drawn && hand_drawn.is_none() {
        return Err(CityConfigError::MissingHandDrawn {
            name: city.name.clone(),
        });
    }

    let (boundary, center) = match hand_drawn {
        Some(h) => {
            let mut properties = h.properties.clone();
            properties
                .entry("City".to_string())
                .or_insert_with(|| serde_json::Value::String(city.name.clone()));
            (
                BoundarySource::HandDrawn {
                    coordinates: h.coordinates.clone(),
                    properties,
                },
                h.center.map_or(CenterSource::Dataset, |[lon, lat]| {
                    CenterSource::Literal { lon, lat }
                }),
            )
        }
        None => (BoundarySource::Dataset, CenterSource::Dataset),
    };

    let tuning = overrides
        .overrides
        .iter()
        .find(|o| o.city == city.name)
        .cloned()
        .unwrap_or_else(|| CityOverride {
            city: city.name.clone(),
            ..CityOverride::default()
        });

    Ok(ResolvedCity {
        name: city.name.clone(),
        hemisphere: city.hemisphere,
        boundary,
        center,
        tuning,
    })
}
