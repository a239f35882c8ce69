//! # pleme-graphql-relay
//!
//! Client-side Relay pagination and cache reconciliation for Pleme platform apps.
//!
//! ## Features
//!
//! - **Relay Tokens** - `arrayconnection` cursors and global IDs
//! - **Pagination State** - offset and cursor strategies, fetch and paged modes
//! - **Result Projection** - single-field unwrap or custom pick with a default
//! - **List Queries** - incremental fetching, page merging, scroll triggering
//! - **Cache Reconciliation** - add/change/delete/reset edits after mutations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pleme_graphql_relay::{InMemoryCache, OffsetPagination, RelayQuery, ReconcileOptions};
//!
//! let users = RelayQuery::new(transport, cache, USERS_QUERY, variables, OffsetPagination::default());
//! users.load().await?;
//! users.fetch_more_data().await?;
//! users.add_update(&mutation_data, &ReconcileOptions::default())?;
//! ```

pub mod relay;
pub mod types;
pub mod pagination;
pub mod result;
pub mod cache;
pub mod reconcile;
pub mod transport;
pub mod scroll;
pub mod query;
pub mod common;

pub use relay::{CursorCodec, GlobalId, cursor, from_global_id, to_global_id};
pub use types::{Connection, Edge, PageInfo, Variables};
pub use pagination::{
    CursorPagination, OffsetPagination, Pagination, PaginationMode, PaginationOptions,
    PaginationVariables,
};
pub use result::ResultProjector;
pub use cache::{CacheKey, CacheStore, InMemoryCache};
pub use reconcile::{InsertPosition, ReconcileOptions};
pub use transport::{QueryRequest, SchemaTransport, Transport};
pub use scroll::{ScrollDirection, ScrollOptions, ScrollTarget};
pub use query::{QuerySnapshot, QueryStatus, RelayQuery};
pub use common::CommonQuery;

use thiserror::Error;

/// Relay client errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("Malformed global ID: {0}")]
    MalformedGlobalId(String),

    #[error("No cached result for query: {0}")]
    CacheMiss(String),

    #[error("Projection error: {0}")]
    ProjectionError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Pagination error: {0}")]
    PaginationError(String),

    #[error("Unexpected result shape: {0}")]
    ShapeError(String),
}

/// Result type for relay client operations
pub type Result<T> = std::result::Result<T, RelayError>;
