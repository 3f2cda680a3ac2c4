use crate::location::LocationResolver;
use crate::search::{spawn_search_feed, RestaurantSearch, SearchFilters, SearchState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct AppState {
    pub resolver: Arc<LocationResolver>,
    /// Filters the search feed follows; requests update them.
    pub filters: watch::Sender<SearchFilters>,
    /// Latest results of the search feed.
    pub results: watch::Receiver<SearchState>,
    feed: JoinHandle<()>,
}

impl AppState {
    /// Wire the search feed to the resolver. Must be called inside a tokio
    /// runtime.
    pub fn new(resolver: Arc<LocationResolver>, search: Arc<dyn RestaurantSearch>) -> Self {
        let (filters, filters_rx) = watch::channel(SearchFilters::default());
        let (results, feed) = spawn_search_feed(search, resolver.subscribe(), filters_rx);
        Self {
            resolver,
            filters,
            results,
            feed,
        }
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.feed.abort();
    }
}
