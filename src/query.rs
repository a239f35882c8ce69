//! Relay list query orchestration
//!
//! [`RelayQuery`] ties a pagination state to a transport and a cache entry:
//!
//! - the initial load runs with the pagination variables, overridden by the
//!   caller's variables, and stores the result under that cache key
//! - every change to the entry is projected into a flat node list, and the
//!   counters are fed back into the pagination state
//! - [`RelayQuery::fetch_more_data`] loads the next page and merges its edges
//!   into the same entry
//! - mutations patch the entry through the reconciliation helpers
//!
//! State changes are published as [`QuerySnapshot`]s on a `watch` channel.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{self, CacheKey, CacheStore};
use crate::pagination::{OffsetPagination, Pagination, PaginationMode};
use crate::reconcile::{self, ReconcileOptions};
use crate::result::ResultProjector;
use crate::scroll::{ScrollDirection, ScrollOptions, ScrollTarget};
use crate::transport::{QueryRequest, Transport};
use crate::types::{merge_variables, Connection, Variables};
use crate::RelayError;

/// Lifecycle of a list query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    FetchingMore,
    /// The initial load failed
    Failed(String),
}

/// Observable state of a list query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub status: QueryStatus,
    pub nodes: Vec<Value>,
    pub total_count: usize,
    pub page: usize,
    pub fetch_more_available: bool,
    /// Error of the last failed incremental fetch, cleared by the next success
    pub last_error: Option<String>,
}

struct QueryState<P> {
    pagination: P,
    status: QueryStatus,
    in_flight: bool,
    mounted: bool,
    generation: u64,
    scroll_armed: bool,
    scroll_positioned: bool,
    nodes: Vec<Value>,
    last_error: Option<String>,
}

impl<P: Pagination> QueryState<P> {
    fn new(pagination: P) -> Self {
        Self {
            pagination,
            status: QueryStatus::Idle,
            in_flight: false,
            mounted: true,
            generation: 0,
            scroll_armed: false,
            scroll_positioned: false,
            nodes: Vec::new(),
            last_error: None,
        }
    }

    fn fetch_more_available(&self) -> bool {
        self.mounted
            && self.pagination.mode() == PaginationMode::Fetch
            && self.status == QueryStatus::Loaded
            && !self.in_flight
            && self.pagination.has_more()
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            status: self.status.clone(),
            nodes: self.nodes.clone(),
            total_count: self.pagination.total_count(),
            page: self.pagination.page(),
            fetch_more_available: self.fetch_more_available(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Paginated list query bound to a transport and a cache
pub struct RelayQuery<T, C, P = OffsetPagination> {
    transport: T,
    cache: C,
    document: String,
    variables: Variables,
    scroll: ScrollOptions,
    projector: ResultProjector,
    state: Mutex<QueryState<P>>,
    snapshot: watch::Sender<QuerySnapshot>,
}

impl<T, C> RelayQuery<T, C, OffsetPagination>
where
    T: Transport,
    C: CacheStore,
{
    /// List query with default offset pagination (30 per page, fetch mode)
    pub fn with_defaults(transport: T, cache: C, document: impl Into<String>, variables: Variables) -> Self {
        Self::new(transport, cache, document, variables, OffsetPagination::default())
    }
}

impl<T, C, P> RelayQuery<T, C, P>
where
    T: Transport,
    C: CacheStore,
    P: Pagination,
{
    pub fn new(
        transport: T,
        cache: C,
        document: impl Into<String>,
        variables: Variables,
        pagination: P,
    ) -> Self {
        let state = QueryState::new(pagination);
        let (snapshot, _) = watch::channel(state.snapshot());
        Self {
            transport,
            cache,
            document: document.into(),
            variables,
            scroll: ScrollOptions::default(),
            projector: ResultProjector::new(json!({ "totalCount": 0, "edges": [] })),
            state: Mutex::new(state),
            snapshot,
        }
    }

    pub fn with_scroll(mut self, scroll: ScrollOptions) -> Self {
        self.scroll = scroll;
        self
    }

    /// Replace the projector that extracts the connection from the raw result
    pub fn with_projector(mut self, projector: ResultProjector) -> Self {
        self.projector = projector;
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueryState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &QueryState<P>) {
        self.snapshot.send_replace(state.snapshot());
    }

    fn query_variables(&self, pagination: &P) -> Variables {
        merge_variables(&pagination.variables().into_variables(), &self.variables)
    }

    fn key_for(&self, state: &QueryState<P>) -> CacheKey {
        CacheKey::new(self.document.as_str(), &self.query_variables(&state.pagination))
    }

    /// Re-derive nodes and counters from the cache entry
    fn recompute(&self, state: &mut QueryState<P>) {
        let raw = self.cache.get(&self.key_for(state));
        let projected = self.projector.project(raw.as_ref());
        let connection: Connection = match serde_json::from_value(projected) {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, query = %self.document, "cached result is not a connection");
                Connection::empty()
            }
        };

        state
            .pagination
            .record_fetch(connection.total_count, connection.len(), connection.page_info.clone());
        if state.pagination.mode() == PaginationMode::Fetch {
            state.pagination.recompute_page();
        }

        state.nodes = connection.into_nodes();
        if !state.scroll_armed && state.nodes.len() == state.pagination.page_size() {
            state.scroll_armed = true;
        }
        self.publish(state);
    }

    /// Cache key of the list's result
    pub fn cache_key(&self) -> CacheKey {
        self.key_for(&self.lock())
    }

    /// Variables of the initial fetch: pagination first, caller's on top
    pub fn variables(&self) -> Variables {
        self.query_variables(&self.lock().pagination)
    }

    /// Run the initial query and store its result.
    ///
    /// Transport failures are returned as-is and leave the query `Failed`;
    /// nothing is retried.
    pub async fn load(&self) -> crate::Result<()> {
        let (request, key, generation) = {
            let mut state = self.lock();
            state.generation += 1;
            state.in_flight = false;
            state.status = QueryStatus::Loading;
            self.publish(&state);

            let variables = self.query_variables(&state.pagination);
            let key = CacheKey::new(self.document.as_str(), &variables);
            (QueryRequest::new(self.document.as_str(), variables), key, state.generation)
        };

        debug!(query = %self.document, variables = %key.variables, "loading list");
        let result = self.transport.execute(request).await;

        let mut state = self.lock();
        if !state.mounted || state.generation != generation {
            debug!(query = %self.document, "discarding stale initial result");
            return Ok(());
        }

        match result {
            Ok(data) => {
                self.cache.set(&key, data);
                state.status = QueryStatus::Loaded;
                state.last_error = None;
                self.recompute(&mut state);
                Ok(())
            }
            Err(error) => {
                warn!(%error, query = %self.document, "list query failed");
                state.status = QueryStatus::Failed(error.to_string());
                self.publish(&state);
                Err(error)
            }
        }
    }

    /// Reload from the first page
    pub async fn refetch(&self) -> crate::Result<()> {
        {
            let mut state = self.lock();
            if state.pagination.mode() == PaginationMode::Fetch {
                state.pagination.set_page(1);
            }
        }
        self.load().await
    }

    /// Show another page of a paged list
    pub async fn go_to_page(&self, page: usize) -> crate::Result<()> {
        if page == 0 {
            return Err(RelayError::PaginationError(
                "'page' must be at least 1".to_string(),
            ));
        }
        {
            let mut state = self.lock();
            if (page - 1).checked_mul(state.pagination.page_size()).is_none() {
                return Err(RelayError::PaginationError(format!(
                    "page {page} is out of range for page size {}",
                    state.pagination.page_size()
                )));
            }
            state.pagination.set_page(page);
        }
        self.load().await
    }

    /// Whether an incremental fetch may start now
    pub fn fetch_more_available(&self) -> bool {
        self.lock().fetch_more_available()
    }

    /// Fetch the next page and merge it into the list.
    ///
    /// Returns `Ok(false)` without touching the transport when no fetch is
    /// available, including while another incremental fetch is in flight.
    /// A page arriving after [`unmount`](Self::unmount) or a reload is dropped.
    pub async fn fetch_more_data(&self) -> crate::Result<bool> {
        let (request, key, generation, page) = {
            let mut state = self.lock();
            if !state.fetch_more_available() {
                return Ok(false);
            }

            state.in_flight = true;
            state.status = QueryStatus::FetchingMore;
            let page = state.pagination.page().saturating_add(1);
            state.pagination.set_page(page);

            let incremental = state.pagination.incremental_variables().into_variables();
            let variables = merge_variables(&self.variables, &incremental);
            let key = self.key_for(&state);
            self.publish(&state);
            (QueryRequest::new(self.document.as_str(), variables), key, state.generation, page)
        };

        debug!(query = %self.document, page, "fetching more");
        let result = self.transport.execute(request).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!(query = %self.document, page, "discarding page from a previous load");
            return Ok(false);
        }
        state.in_flight = false;
        state.status = QueryStatus::Loaded;
        if !state.mounted {
            debug!(query = %self.document, page, "discarding page for unmounted list");
            return Ok(false);
        }

        let merged = result.and_then(|fetched| match self.cache.get(&key) {
            Some(previous) => merge_pages(previous, &fetched, self.scroll.direction),
            None => Ok(fetched),
        });

        match merged {
            Ok(merged) => {
                self.cache.set(&key, merged);
                state.last_error = None;
                self.recompute(&mut state);
                debug!(query = %self.document, page, count = state.nodes.len(), "page merged");
                Ok(true)
            }
            Err(error) => {
                warn!(%error, query = %self.document, page, "fetching more failed");
                state.last_error = Some(error.to_string());
                self.recompute(&mut state);
                Err(error)
            }
        }
    }

    /// Prepare a scroll container once the first full page has loaded.
    ///
    /// Reverse lists are scrolled to the bottom the first time. Returns whether
    /// scroll triggering is active.
    pub fn attach_scroll<S: ScrollTarget + ?Sized>(&self, target: &mut S) -> bool {
        let mut state = self.lock();
        if !state.scroll_armed {
            return false;
        }
        if self.scroll.direction == ScrollDirection::Up && !state.scroll_positioned {
            target.set_scroll_top(target.scroll_height());
            state.scroll_positioned = true;
        }
        true
    }

    /// Handle a scroll event on the container.
    ///
    /// Loads the next page when the growing edge is within the trigger
    /// distance. For reverse lists still inside the trigger zone after the
    /// fetch, the offset is pushed just outside it so the next event does not
    /// fire another fetch immediately.
    pub async fn on_scroll<S: ScrollTarget + ?Sized>(&self, target: &mut S) -> crate::Result<bool> {
        {
            let state = self.lock();
            if !state.scroll_armed || !state.fetch_more_available() {
                return Ok(false);
            }
        }
        if !self.scroll.in_trigger_zone(&*target) {
            return Ok(false);
        }

        let fetched = self.fetch_more_data().await?;

        if self.scroll.direction == ScrollDirection::Up
            && self.scroll.in_trigger_zone(&*target)
            && self.fetch_more_available()
        {
            target.set_scroll_top(self.scroll.rest_position());
        }
        Ok(fetched)
    }

    /// Mark the list as torn down; in-flight results are dropped on arrival
    pub fn unmount(&self) {
        let mut state = self.lock();
        state.mounted = false;
        self.publish(&state);
    }

    /// Re-read the cache entry, e.g. after another writer patched it
    pub fn refresh(&self) {
        let mut state = self.lock();
        self.recompute(&mut state);
    }

    pub fn status(&self) -> QueryStatus {
        self.lock().status.clone()
    }

    /// Current flat node list
    pub fn data(&self) -> Vec<Value> {
        self.lock().nodes.clone()
    }

    /// Current node list deserialized into `N`
    pub fn data_as<N: DeserializeOwned>(&self) -> crate::Result<Vec<N>> {
        self.data()
            .into_iter()
            .map(|node| {
                serde_json::from_value(node).map_err(|e| RelayError::ShapeError(e.to_string()))
            })
            .collect()
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot> {
        self.snapshot.subscribe()
    }

    /// Inspect the pagination state
    pub fn with_pagination<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.lock().pagination)
    }

    /// Apply a custom transform to the cached result
    pub fn update<F>(&self, strict: bool, transform: F) -> crate::Result<()>
    where
        F: FnOnce(Value) -> crate::Result<Value>,
    {
        let key = self.cache_key();
        cache::update(&self.cache, &key, strict, transform)?;
        self.refresh();
        Ok(())
    }

    /// Insert the mutation's entities as new edges
    pub fn add_update(&self, mutation: &Value, options: &ReconcileOptions) -> crate::Result<()> {
        self.update(options.strict, |cached| {
            reconcile::add_edges(cached, mutation, options.key.as_deref(), options.position)
        })
    }

    /// Merge the mutated entity into its cached node
    pub fn change_update(&self, mutation: &Value, options: &ReconcileOptions) -> crate::Result<()> {
        self.update(options.strict, |cached| {
            reconcile::change_edge(cached, mutation, options.key.as_deref())
        })
    }

    /// Drop the deleted entity's edge
    pub fn delete_update(&self, mutation: &Value, strict: bool) -> crate::Result<()> {
        self.update(strict, |cached| reconcile::delete_edge(cached, mutation))
    }

    /// Replace the cached list with the one returned by the mutation
    pub fn reset_update(&self, mutation: &Value, strict: bool) -> crate::Result<()> {
        self.update(strict, |cached| reconcile::reset_field(cached, mutation))
    }
}

/// Merge a fetched page into the previous result, field by field
fn merge_pages(previous: Value, fetched: &Value, direction: ScrollDirection) -> crate::Result<Value> {
    let Value::Object(previous) = previous else {
        return Err(RelayError::ShapeError(
            "cached list result is not an object".to_string(),
        ));
    };

    let mut merged = Map::new();
    for (field, value) in previous {
        let previous: Connection = serde_json::from_value(value)
            .map_err(|e| RelayError::ShapeError(format!("{field}: {e}")))?;
        let page = fetched
            .get(field.as_str())
            .cloned()
            .ok_or_else(|| RelayError::ShapeError(format!("fetched page has no '{field}'")))?;
        let page: Connection = serde_json::from_value(page)
            .map_err(|e| RelayError::ShapeError(format!("{field}: {e}")))?;

        let edges = match direction {
            ScrollDirection::Down => previous.edges.into_iter().chain(page.edges).collect(),
            ScrollDirection::Up => page.edges.into_iter().chain(previous.edges).collect(),
        };
        let connection = Connection {
            typename: previous.typename,
            total_count: page.total_count,
            edges,
            page_info: page.page_info,
        };

        let connection = serde_json::to_value(connection)
            .map_err(|e| RelayError::ShapeError(format!("{field}: {e}")))?;
        merged.insert(field, connection);
    }

    Ok(Value::Object(merged))
}
