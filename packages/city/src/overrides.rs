//! Operator override file.
//!
//! ```toml
//! [[override]]
//! city = "NewYork"
//! mode_offset = 1
//!
//! [[override]]
//! city = "Tokyo"
//! mode_scale = { type = "nominal" }
//!
//! [[hand_drawn]]
//! city = "Pokhara"
//! coordinates = [[83.96, 28.25], [83.96, 28.19], [84.02, 28.19], [84.02, 28.25]]
//! properties = { TARGET_FID = 109 }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use greenspace_city_models::{HandDrawnBoundary, ModeScale, OverrideFile};

use crate::CityConfigError;

/// Reads and validates an override file.
///
/// # Errors
///
/// Returns [`CityConfigError`] if the file cannot be read or parsed, or
/// if any entry is invalid (see [`validate`]).
pub fn load(path: &Path) -> Result<OverrideFile, CityConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| CityConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: OverrideFile = toml::from_str(&text).map_err(|source| CityConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&file)?;

    log::info!(
        "Loaded {} override(s) and {} hand-drawn boundary(ies) from {}",
        file.overrides.len(),
        file.hand_drawn.len(),
        path.display()
    );
    Ok(file)
}

/// Checks that each city appears at most once per section and that every
/// value is usable.
///
/// # Errors
///
/// Returns [`CityConfigError::DuplicateCity`] or
/// [`CityConfigError::Invalid`].
pub fn validate(file: &OverrideFile) -> Result<(), CityConfigError> {
    let mut seen = BTreeSet::new();
    for entry in &file.overrides {
        if !seen.insert(entry.city.as_str()) {
            return Err(CityConfigError::DuplicateCity {
                name: entry.city.clone(),
            });
        }
        if let Some(ModeScale::Fixed { meters }) = entry.mode_scale
            && !(meters.is_finite() && meters > 0.0)
        {
            return Err(invalid(&entry.city, format!("mode_scale {meters} m")));
        }
        if let Some(distance) = entry.cost_max_distance_m
            && !(distance.is_finite() && distance > 0.0)
        {
            return Err(invalid(
                &entry.city,
                format!("cost_max_distance_m {distance}"),
            ));
        }
    }

    let mut seen = BTreeSet::new();
    for boundary in &file.hand_drawn {
        if !seen.insert(boundary.city.as_str()) {
            return Err(CityConfigError::DuplicateCity {
                name: boundary.city.clone(),
            });
        }
        validate_boundary(boundary)?;
    }

    Ok(())
}

fn validate_boundary(boundary: &HandDrawnBoundary) -> Result<(), CityConfigError> {
    let city = &boundary.city;

    let mut distinct: Vec<[f64; 2]> = Vec::with_capacity(boundary.coordinates.len());
    for point in &boundary.coordinates {
        check_lon_lat(city, *point)?;
        if !distinct.contains(point) {
            distinct.push(*point);
        }
    }
    if distinct.len() < 3 {
        return Err(invalid(
            city,
            format!(
                "boundary needs at least 3 distinct points, got {}",
                distinct.len()
            ),
        ));
    }

    if let Some(center) = boundary.center {
        check_lon_lat(city, center)?;
    }

    Ok(())
}

fn check_lon_lat(city: &str, [lon, lat]: [f64; 2]) -> Result<(), CityConfigError> {
    if (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        Err(invalid(city, format!("coordinate [{lon}, {lat}] out of range")))
    }
}

fn invalid(city: &str, message: String) -> CityConfigError {
    CityConfigError::Invalid {
        city: city.to_string(),
        message,
    }
}
