//! Client for the restaurant search backend.

use super::filters::SearchQuery;
use crate::location::Coordinates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const EARTH_RADIUS_MILES: f64 = 3958.8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("Search backend unreachable: {0}")]
    Network(String),
    #[error("Search backend returned HTTP {0}")]
    Status(u16),
    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub menu_item_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub calories: u32,
    #[serde(default)]
    pub fat_g: Option<f64>,
    #[serde(default)]
    pub carbs_g: Option<f64>,
    #[serde(default)]
    pub protein_g: Option<f64>,
    #[serde(default)]
    pub sugar_g: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub restaurant_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub chain_name: Option<String>,
    #[serde(default)]
    pub menu_items: Vec<MenuItem>,
}

impl Restaurant {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Lowest-calorie item on the menu.
    pub fn lightest_item(&self) -> Option<&MenuItem> {
        self.menu_items.iter().min_by_key(|item| item.calories)
    }
}

/// Great-circle distance in miles.
pub fn distance_miles(from: Coordinates, to: Coordinates) -> f64 {
    let (lat1, lat2) = (from.latitude.to_radians(), to.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

/// Anything that can answer a restaurant search.
#[async_trait]
pub trait RestaurantSearch: Send + Sync {
    async fn search(&self, query: SearchQuery) -> Result<Vec<Restaurant>, SearchError>;
}

/// HTTP client for `GET {base_url}/restaurants/search`.
#[derive(Clone)]
pub struct SearchClient {
    agent: ureq::Agent,
    base_url: String,
}

impl SearchClient {
    pub fn new(agent: ureq::Agent, base_url: impl Into<String>) -> Self {
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/restaurants/search", self.base_url)
    }
}

#[async_trait]
impl RestaurantSearch for SearchClient {
    async fn search(&self, query: SearchQuery) -> Result<Vec<Restaurant>, SearchError> {
        let agent = self.agent.clone();
        let url = self.endpoint();
        let restaurants: Vec<Restaurant> = tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            for (key, value) in query.params() {
                request = request.query(key, &value);
            }
            let response = request.call().map_err(|e| match e {
                ureq::Error::Status(code, _) => SearchError::Status(code),
                ureq::Error::Transport(t) => SearchError::Network(t.to_string()),
            })?;
            response
                .into_json::<Vec<Restaurant>>()
                .map_err(|e| SearchError::InvalidResponse(e.to_string()))
        })
        .await
        .map_err(|e| SearchError::Network(format!("search task failed: {}", e)))??;

        debug!(count = restaurants.len(), "restaurant search returned");
        Ok(restaurants)
    }
}

/// Terminal listing: one line per restaurant, nearest first.
pub fn render_restaurant_list(origin: Coordinates, restaurants: &[Restaurant]) -> String {
    if restaurants.is_empty() {
        return "  No restaurants match these filters.\n".to_string();
    }

    let mut rows: Vec<(f64, &Restaurant)> = restaurants
        .iter()
        .map(|r| (distance_miles(origin, r.coordinates()), r))
        .collect();
    rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = String::new();
    for (miles, r) in rows {
        out.push_str(&format!("  \u{1F354} {} ({:.1} mi)\n", r.name, miles));
        out.push_str(&format!("     {}\n", r.address));
        if let Some(item) = r.lightest_item() {
            out.push_str(&format!(
                "     lightest: {} \u{2014} {} kcal ({} items)\n",
                item.name,
                item.calories,
                r.menu_items.len()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn restaurant(name: &str, lat: f64, lon: f64, calories: &[u32]) -> Restaurant {
        Restaurant {
            restaurant_id: name.to_lowercase(),
            name: name.to_string(),
            address: "1 Main St".to_string(),
            latitude: lat,
            longitude: lon,
            chain_name: None,
            menu_items: calories
                .iter()
                .enumerate()
                .map(|(i, c)| MenuItem {
                    menu_item_id: format!("{}-{}", name, i),
                    name: format!("Item {}", i),
                    description: None,
                    calories: *c,
                    fat_g: None,
                    carbs_g: None,
                    protein_g: None,
                    sugar_g: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_distance_miles() {
        let la = Coordinates::new(34.0522, -118.2437);
        let sf = Coordinates::new(37.7749, -122.4194);
        assert_relative_eq!(distance_miles(la, sf), 347.4, epsilon = 1.0);
        assert_relative_eq!(distance_miles(la, la), 0.0);
    }

    #[test]
    fn test_decode_backend_payload() {
        let body = r#"[{
            "restaurant_id": "r1",
            "name": "Burger Barn",
            "address": "12 Sunset Blvd",
            "latitude": 34.06,
            "longitude": -118.25,
            "chain_name": "Burger Barn",
            "created_date": "2024-01-01T00:00:00",
            "last_modified_date": "2024-01-01T00:00:00",
            "menu_items": [{
                "menu_item_id": "m1",
                "restaurant_id": "r1",
                "name": "Side Salad",
                "calories": 120,
                "protein_g": 3.5,
                "created_date": "2024-01-01T00:00:00",
                "last_modified_date": "2024-01-01T00:00:00"
            }]
        }]"#;
        let restaurants: Vec<Restaurant> = serde_json::from_str(body).unwrap();
        assert_eq!(restaurants.len(), 1);
        assert_eq!(restaurants[0].menu_items[0].calories, 120);
        assert_eq!(restaurants[0].menu_items[0].protein_g, Some(3.5));
    }

    #[test]
    fn test_lightest_item() {
        let r = restaurant("Taco Hut", 0.0, 0.0, &[640, 310, 480]);
        assert_eq!(r.lightest_item().unwrap().calories, 310);
        assert!(restaurant("Empty", 0.0, 0.0, &[]).lightest_item().is_none());
    }

    #[test]
    fn test_render_sorts_nearest_first() {
        let origin = Coordinates::new(34.05, -118.24);
        let far = restaurant("Far Fries", 34.20, -118.24, &[500]);
        let near = restaurant("Near Nuggets", 34.051, -118.24, &[250]);
        let out = render_restaurant_list(origin, &[far, near]);
        let near_pos = out.find("Near Nuggets").unwrap();
        let far_pos = out.find("Far Fries").unwrap();
        assert!(near_pos < far_pos);
        assert!(out.contains("250 kcal"));
    }

    #[test]
    fn test_render_empty() {
        let out = render_restaurant_list(Coordinates::new(0.0, 0.0), &[]);
        assert!(out.contains("No restaurants"));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = SearchClient::new(ureq::agent(), "http://localhost:8000/");
        assert_eq!(client.endpoint(), "http://localhost:8000/restaurants/search");
    }
}
