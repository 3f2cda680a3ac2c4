use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::location::{LocationSnapshot, LocationSource, ResolvedLocation};
use crate::search::{
    filter_options, parse_limit, FilterOptions, Restaurant, SearchFilters, SearchState,
};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

// ─── GET /api/location ───────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub location: Option<ResolvedLocation>,
    pub loading: bool,
    pub error: Option<String>,
    pub using_fallback: bool,
    pub source: Option<LocationSource>,
    pub attempt: u64,
}

impl From<LocationSnapshot> for LocationResponse {
    fn from(snap: LocationSnapshot) -> Self {
        Self {
            loading: snap.loading(),
            using_fallback: snap.using_fallback(),
            error: snap.status.error_message,
            location: snap.location,
            source: snap.source,
            attempt: snap.attempt,
        }
    }
}

pub async fn location(State(state): State<Arc<AppState>>) -> Json<LocationResponse> {
    Json(state.resolver.snapshot().into())
}

// ─── POST /api/location/retry ────────────────────────────────────

pub async fn retry(State(state): State<Arc<AppState>>) -> (StatusCode, Json<LocationResponse>) {
    state.resolver.retry();
    let snap = state.resolver.snapshot();
    info!(attempt = snap.attempt, "POST /api/location/retry");
    (StatusCode::ACCEPTED, Json(snap.into()))
}

// ─── GET /api/restaurants ────────────────────────────────────────

/// How long a request waits for the search feed to answer its filters.
const RESULTS_WAIT: Duration = Duration::from_secs(30);

#[derive(Deserialize, Default)]
pub struct RestaurantsQuery {
    pub calories: Option<String>,
    pub mileage: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestaurantsResponse {
    pub location: ResolvedLocation,
    pub using_fallback: bool,
    pub filters: SearchFilters,
    pub restaurants: Vec<Restaurant>,
}

/// Point the search feed at the requested filters and return its results
/// once they match.
pub async fn restaurants(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RestaurantsQuery>,
) -> Result<Json<RestaurantsResponse>, ApiError> {
    let start = Instant::now();

    let filters = parse_filters(&params)?;
    state.filters.send_if_modified(|current| {
        let changed = *current != filters;
        *current = filters;
        changed
    });

    let snap = state.resolver.snapshot();
    let location = snap.location.clone().ok_or_else(|| {
        api_error(StatusCode::SERVICE_UNAVAILABLE, "Location not resolved yet")
    })?;

    let mut results = state.results.clone();
    let wanted = |s: &SearchState| !s.loading && s.query.is_some_and(|q| q.uses_filters(filters));
    let current = match timeout(RESULTS_WAIT, results.wait_for(wanted)).await {
        Ok(Ok(current)) => current.clone(),
        Ok(Err(_)) => {
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Search feed stopped"));
        }
        Err(_) => {
            warn!("search feed did not answer within {:?}", RESULTS_WAIT);
            return Err(api_error(StatusCode::GATEWAY_TIMEOUT, "Search timed out"));
        }
    };

    if let Some(error) = current.error {
        return Err(api_error(StatusCode::BAD_GATEWAY, error));
    }

    info!(
        "GET /api/restaurants lat={:.4} lng={:.4} calories={:?} mileage={:?} -> {} ({:.1}ms)",
        location.latitude,
        location.longitude,
        filters.max_calories,
        filters.max_miles,
        current.restaurants.len(),
        start.elapsed().as_secs_f64() * 1000.0,
    );

    Ok(Json(RestaurantsResponse {
        location,
        using_fallback: snap.using_fallback(),
        filters,
        restaurants: current.restaurants,
    }))
}

// ─── GET /api/restaurants/{id} ───────────────────────────────────

/// Look up a restaurant among the current results.
pub async fn restaurant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Restaurant>, ApiError> {
    let results = state.results.borrow();
    results
        .restaurants
        .iter()
        .find(|r| r.restaurant_id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Restaurant '{}' not found", id)))
}

// ─── GET /api/filters ────────────────────────────────────────────

pub async fn filters() -> Json<FilterOptions> {
    Json(filter_options())
}

// ─── Helpers ─────────────────────────────────────────────────────

fn parse_filters(params: &RestaurantsQuery) -> Result<SearchFilters, ApiError> {
    let parse = |v: &Option<String>| match v {
        Some(s) => parse_limit(s).map_err(|e| api_error(StatusCode::BAD_REQUEST, e)),
        None => Ok(None),
    };
    Ok(SearchFilters {
        max_calories: parse(&params.calories)?,
        max_miles: parse(&params.mileage)?,
    })
}
