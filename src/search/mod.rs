//! Restaurant search: filters, the backend client, and the feed that keeps
//! results in step with the resolved location.

pub mod client;
pub mod feed;
pub mod filters;

pub use client::{
    distance_miles, render_restaurant_list, MenuItem, Restaurant, RestaurantSearch, SearchClient,
    SearchError,
};
pub use feed::{spawn_search_feed, SearchState};
pub use filters::{filter_options, parse_limit, FilterOptions, SearchFilters, SearchQuery};
