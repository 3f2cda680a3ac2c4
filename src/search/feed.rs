//! Keeps restaurant results in step with the resolved location and filters.

use super::client::{Restaurant, RestaurantSearch};
use super::filters::{SearchFilters, SearchQuery};
use crate::location::LocationSnapshot;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchState {
    pub restaurants: Vec<Restaurant>,
    pub loading: bool,
    pub error: Option<String>,
    /// The query the current results (or error) belong to.
    pub query: Option<SearchQuery>,
}

/// Spawn a task that searches whenever the location or filters change.
///
/// A failed search keeps the previous results and is tried again on the
/// next location or filter change. The task ends when either
/// input channel closes or every state receiver is dropped.
pub fn spawn_search_feed(
    search: Arc<dyn RestaurantSearch>,
    mut location_rx: watch::Receiver<LocationSnapshot>,
    mut filters_rx: watch::Receiver<SearchFilters>,
) -> (watch::Receiver<SearchState>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(SearchState::default());

    let handle = tokio::spawn(async move {
        let mut last: Option<SearchQuery> = None;
        loop {
            let query = {
                let filters = *filters_rx.borrow_and_update();
                let snap = location_rx.borrow_and_update();
                snap.location.as_ref().map(|loc| SearchQuery::new(loc, filters))
            };

            if let Some(query) = query.filter(|q| last.as_ref() != Some(q)) {
                last = Some(query);
                tx.send_modify(|state| {
                    state.loading = true;
                    state.query = Some(query);
                });
                debug!(?query, "searching restaurants");
                match search.search(query).await {
                    Ok(restaurants) => tx.send_modify(|state| {
                        state.restaurants = restaurants;
                        state.error = None;
                        state.loading = false;
                    }),
                    Err(e) => {
                        warn!("restaurant search failed: {}", e);
                        last = None;
                        tx.send_modify(|state| {
                            state.error = Some(e.to_string());
                            state.loading = false;
                        });
                    }
                }
            }

            tokio::select! {
                changed = location_rx.changed() => if changed.is_err() { break },
                changed = filters_rx.changed() => if changed.is_err() { break },
                _ = tx.closed() => break,
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Coordinates, ResolvedLocation};
    use crate::search::client::SearchError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSearch {
        queries: Mutex<Vec<SearchQuery>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RestaurantSearch for FakeSearch {
        async fn search(&self, query: SearchQuery) -> Result<Vec<Restaurant>, SearchError> {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query);
            if self.fail_after.is_some_and(|n| queries.len() > n) {
                return Err(SearchError::Status(500));
            }
            Ok(vec![Restaurant {
                restaurant_id: format!("r{}", queries.len()),
                name: "Salad Stop".into(),
                address: "5 Elm St".into(),
                latitude: query.lat,
                longitude: query.lng,
                chain_name: None,
                menu_items: vec![],
            }])
        }
    }

    fn located(lat: f64, lon: f64, attempt: u64) -> LocationSnapshot {
        LocationSnapshot {
            location: Some(ResolvedLocation::bare(Coordinates::new(lat, lon))),
            attempt,
            ..LocationSnapshot::default()
        }
    }

    async fn settled(rx: &mut watch::Receiver<SearchState>, query: SearchQuery) -> SearchState {
        rx.wait_for(|s| s.query == Some(query) && !s.loading)
            .await
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_searches_once_location_arrives() {
        let search = Arc::new(FakeSearch::default());
        let (loc_tx, loc_rx) = watch::channel(LocationSnapshot::default());
        let (_filters_tx, filters_rx) = watch::channel(SearchFilters::default());
        let (mut state_rx, _handle) = spawn_search_feed(search.clone(), loc_rx, filters_rx);

        loc_tx.send(located(34.05, -118.24, 1)).unwrap();
        let loc = ResolvedLocation::bare(Coordinates::new(34.05, -118.24));
        let state = settled(&mut state_rx, SearchQuery::new(&loc, SearchFilters::default())).await;

        assert_eq!(state.restaurants.len(), 1);
        assert_eq!(state.error, None);
        let queries = search.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].mileage, 50);
    }

    #[tokio::test]
    async fn test_refetches_on_filter_change_but_not_on_same_location() {
        let search = Arc::new(FakeSearch::default());
        let (loc_tx, loc_rx) = watch::channel(located(10.0, 20.0, 1));
        let (filters_tx, filters_rx) = watch::channel(SearchFilters::default());
        let (mut state_rx, _handle) = spawn_search_feed(search.clone(), loc_rx, filters_rx);
        let loc = ResolvedLocation::bare(Coordinates::new(10.0, 20.0));

        settled(&mut state_rx, SearchQuery::new(&loc, SearchFilters::default())).await;

        // A retry that lands on the same coordinates does not search again.
        loc_tx.send(located(10.0, 20.0, 2)).unwrap();

        let filters = SearchFilters {
            max_calories: Some(500),
            max_miles: Some(3),
        };
        filters_tx.send(filters).unwrap();
        settled(&mut state_rx, SearchQuery::new(&loc, filters)).await;

        let queries = search.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].max_calories, Some(500));
        assert_eq!(queries[1].mileage, 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_results() {
        let search = Arc::new(FakeSearch {
            fail_after: Some(1),
            ..FakeSearch::default()
        });
        let (loc_tx, loc_rx) = watch::channel(located(10.0, 20.0, 1));
        let (_filters_tx, filters_rx) = watch::channel(SearchFilters::default());
        let (mut state_rx, _handle) = spawn_search_feed(search.clone(), loc_rx, filters_rx);

        let first = ResolvedLocation::bare(Coordinates::new(10.0, 20.0));
        settled(&mut state_rx, SearchQuery::new(&first, SearchFilters::default())).await;

        loc_tx.send(located(11.0, 21.0, 2)).unwrap();
        let second = ResolvedLocation::bare(Coordinates::new(11.0, 21.0));
        let query = SearchQuery::new(&second, SearchFilters::default());
        let state = settled(&mut state_rx, query).await;

        assert_eq!(state.error.as_deref(), Some("Search backend returned HTTP 500"));
        assert_eq!(state.restaurants.len(), 1);
        assert_eq!(state.restaurants[0].restaurant_id, "r1");
    }

    #[tokio::test]
    async fn test_failed_query_retried_on_next_location() {
        let search = Arc::new(FakeSearch {
            fail_after: Some(0),
            ..FakeSearch::default()
        });
        let (loc_tx, loc_rx) = watch::channel(located(10.0, 20.0, 1));
        let (_filters_tx, filters_rx) = watch::channel(SearchFilters::default());
        let (mut state_rx, _handle) = spawn_search_feed(search.clone(), loc_rx, filters_rx);

        let loc = ResolvedLocation::bare(Coordinates::new(10.0, 20.0));
        let state = settled(&mut state_rx, SearchQuery::new(&loc, SearchFilters::default())).await;
        assert!(state.error.is_some());

        // Same coordinates from a later attempt.
        loc_tx.send(located(10.0, 20.0, 2)).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while search.queries.lock().unwrap().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_feed_stops_when_location_closes() {
        let search = Arc::new(FakeSearch::default());
        let (loc_tx, loc_rx) = watch::channel(LocationSnapshot::default());
        let (_filters_tx, filters_rx) = watch::channel(SearchFilters::default());
        let (_state_rx, handle) = spawn_search_feed(search.clone(), loc_rx, filters_rx);

        drop(loc_tx);
        handle.await.unwrap();
        assert!(search.queries.lock().unwrap().is_empty());
    }
}
