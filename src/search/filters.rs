//! Calorie and distance filters, and the query they produce.

use crate::location::ResolvedLocation;
use serde::Serialize;

/// Radius sent to the backend when the user picked "Any Distance".
pub const ANY_DISTANCE_MILES: u32 = 50;

const CALORIE_LIMITS: &[u32] = &[300, 400, 500, 1000];
const MILEAGE_LIMITS: &[u32] = &[1, 3, 5];

/// The user's current filter selection. `None` means "any".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchFilters {
    pub max_calories: Option<u32>,
    pub max_miles: Option<u32>,
}

/// Parse a filter value: "any" (or empty) is no limit, otherwise a positive integer.
pub fn parse_limit(s: &str) -> Result<Option<u32>, String> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    match s.parse::<u32>() {
        Ok(0) => Err("Limit must be greater than zero, or 'any'".to_string()),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(format!("Invalid limit '{}'. Use a whole number or 'any'.", s)),
    }
}

/// A dropdown entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub calories: Vec<FilterOption>,
    pub distance: Vec<FilterOption>,
}

/// The choices offered to the user.
pub fn filter_options() -> FilterOptions {
    let any = |label: &str| FilterOption {
        label: label.to_string(),
        value: "any".to_string(),
    };

    let mut calories = vec![any("Any Calories")];
    calories.extend(CALORIE_LIMITS.iter().map(|c| FilterOption {
        label: format!("Under {}", c),
        value: c.to_string(),
    }));

    let mut distance = vec![any("Any Distance")];
    distance.extend(MILEAGE_LIMITS.iter().map(|m| FilterOption {
        label: if *m == 1 {
            "Under 1 mile".to_string()
        } else {
            format!("Under {} miles", m)
        },
        value: m.to_string(),
    }));

    FilterOptions { calories, distance }
}

/// Parameters for one restaurant search request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchQuery {
    pub lat: f64,
    pub lng: f64,
    pub mileage: u32,
    pub max_calories: Option<u32>,
}

impl SearchQuery {
    pub fn new(location: &ResolvedLocation, filters: SearchFilters) -> Self {
        Self {
            lat: location.latitude,
            lng: location.longitude,
            mileage: filters.max_miles.unwrap_or(ANY_DISTANCE_MILES),
            max_calories: filters.max_calories,
        }
    }

    /// Whether this query was built from `filters`, whatever the location.
    pub fn uses_filters(&self, filters: SearchFilters) -> bool {
        self.max_calories == filters.max_calories
            && self.mileage == filters.max_miles.unwrap_or(ANY_DISTANCE_MILES)
    }

    /// Query-string pairs in the order the backend documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("lat", self.lat.to_string()),
            ("lng", self.lng.to_string()),
            ("mileage", self.mileage.to_string()),
        ];
        if let Some(cal) = self.max_calories {
            params.push(("max_calories", cal.to_string()));
        }
        params
    }
}
