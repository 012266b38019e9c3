//! Seasonal Landsat composite.
//!
//! Scenes are restricted to the configured date range and to the summer
//! window of the city's hemisphere, then reduced to a cloud-free
//! composite server-side. The southern window runs from late December to
//! late March, so it wraps the year boundary and becomes the union of two
//! day-of-year ranges.

use greenspace_city_models::Hemisphere;
use greenspace_engine::objects::{DateRange, Filter, Image, ImageCollection};
use serde::{Deserialize, Serialize};

use crate::params::AnalysisParams;

/// Last day of a leap year.
const LAST_DAY_OF_YEAR: u16 = 366;

/// An inclusive day-of-year window. `start > end` means the window wraps
/// across the new year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOfYearWindow {
    /// First day (1-based).
    pub start: u16,
    /// Last day (1-based, inclusive).
    pub end: u16,
}

impl DayOfYearWindow {
    /// Both bounds are real days of year.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.start >= 1
            && self.start <= LAST_DAY_OF_YEAR
            && self.end >= 1
            && self.end <= LAST_DAY_OF_YEAR
    }

    /// Whether the window crosses December 31st.
    #[must_use]
    pub const fn wraps(&self) -> bool {
        self.start > self.end
    }

    /// Whether `day` falls inside the window.
    #[must_use]
    pub const fn contains(&self, day: u16) -> bool {
        if self.wraps() {
            day >= self.start || day <= self.end
        } else {
            day >= self.start && day <= self.end
        }
    }

    /// Non-wrapping sub-ranges covering the window.
    #[must_use]
    pub fn ranges(&self) -> Vec<(u16, u16)> {
        if self.wraps() {
            vec![(self.start, LAST_DAY_OF_YEAR), (1, self.end)]
        } else {
            vec![(self.start, self.end)]
        }
    }

    /// The equivalent server-side filter.
    #[must_use]
    pub fn to_filter(&self) -> Filter {
        let mut filters: Vec<Filter> = self
            .ranges()
            .into_iter()
            .map(|(start, end)| Filter::day_of_year(start, end))
            .collect();

        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::or(filters)
        }
    }
}

/// Raw scenes for one city: date range, then the hemisphere's summer
/// window. No spatial filter is applied; the export circle decides the
/// area.
#[must_use]
pub fn seasonal_collection(params: &AnalysisParams, hemisphere: Hemisphere) -> ImageCollection {
    let season = &params.season;
    let window = season.window(hemisphere);
    log::debug!(
        "{hemisphere} composite: {}..{}, days {:?}",
        season.start_date,
        season.end_date,
        window.ranges()
    );

    ImageCollection::load(&params.composite.collection)
        .filter_date(&DateRange::new(&season.start_date, &season.end_date))
        .filter(&window.to_filter())
}

/// Cloud-reduced composite of `collection`.
#[must_use]
pub fn composite(params: &AnalysisParams, collection: &ImageCollection) -> Image {
    let c = &params.composite;
    collection.landsat_simple_composite(c.cloud_score_range, c.max_depth, c.as_float)
}
