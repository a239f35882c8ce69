//! Offset and cursor pagination state
//!
//! A pagination state lives as long as the list that owns it. It computes the
//! variables for the initial and incremental fetches and is told about every
//! result through [`Pagination::record_fetch`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::CursorCodec;
use crate::types::{PageInfo, Variables};
use crate::RelayError;

/// How a list advances through its pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    /// Pages accumulate into a single list (infinite scroll)
    #[default]
    Fetch,
    /// One page is shown at a time; the caller drives `page`
    Paged,
}

/// Pagination options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaginationOptions {
    pub page: usize,
    pub page_size: usize,
    pub mode: PaginationMode,
}

impl PaginationOptions {
    /// Validate pagination options
    pub fn validate(&self) -> crate::Result<()> {
        if self.page == 0 {
            return Err(RelayError::PaginationError(
                "'page' must be at least 1".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(RelayError::PaginationError(
                "'pageSize' must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 30,
            mode: PaginationMode::Fetch,
        }
    }
}

/// Pagination variables sent with a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationVariables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl PaginationVariables {
    /// Convert into a variables map, skipping unset fields
    pub fn into_variables(self) -> Variables {
        let mut variables = Variables::new();
        if let Some(first) = self.first {
            variables.insert("first".to_string(), Value::from(first));
        }
        if let Some(offset) = self.offset {
            variables.insert("offset".to_string(), Value::from(offset));
        }
        if let Some(after) = self.after {
            variables.insert("after".to_string(), Value::String(after));
        }
        variables
    }
}

/// Pagination state shared by the offset and cursor strategies
pub trait Pagination: Send {
    fn mode(&self) -> PaginationMode;

    /// Current page; `0` means nothing has been fetched yet
    fn page(&self) -> usize;

    fn page_size(&self) -> usize;

    /// Number of items currently materialized
    fn count(&self) -> usize;

    /// Total number of items on the server, as reported by the last response
    fn total_count(&self) -> usize;

    /// Cursor page info, if the strategy tracks it
    fn page_info(&self) -> Option<&PageInfo> {
        None
    }

    /// Variables for the initial fetch
    fn variables(&self) -> PaginationVariables;

    /// Variables for the next incremental fetch
    fn incremental_variables(&self) -> PaginationVariables;

    /// Whether the server has items beyond those already fetched
    fn has_more(&self) -> bool;

    fn set_page(&mut self, page: usize);

    /// Record the counters of the latest result
    fn record_fetch(&mut self, total_count: usize, count: usize, page_info: Option<PageInfo>);

    /// Derive `page` from `count`. Only meaningful in fetch mode.
    fn recompute_page(&mut self);
}

/// Pagination based on `first`/`offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPagination {
    mode: PaginationMode,
    page: usize,
    page_size: usize,
    count: usize,
    total_count: usize,
}

impl OffsetPagination {
    pub fn new(options: PaginationOptions) -> crate::Result<Self> {
        options.validate()?;
        Ok(Self {
            mode: options.mode,
            page: options.page,
            page_size: options.page_size,
            count: 0,
            total_count: 0,
        })
    }

    fn page_offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for OffsetPagination {
    fn default() -> Self {
        let options = PaginationOptions::default();
        Self {
            mode: options.mode,
            page: options.page,
            page_size: options.page_size,
            count: 0,
            total_count: 0,
        }
    }
}

impl Pagination for OffsetPagination {
    fn mode(&self) -> PaginationMode {
        self.mode
    }

    fn page(&self) -> usize {
        self.page
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn count(&self) -> usize {
        self.count
    }

    fn total_count(&self) -> usize {
        self.total_count
    }

    fn variables(&self) -> PaginationVariables {
        let offset = match self.mode {
            PaginationMode::Fetch => 0,
            PaginationMode::Paged => self.page_offset(),
        };
        PaginationVariables {
            first: Some(self.page_size),
            offset: Some(offset),
            after: None,
        }
    }

    fn incremental_variables(&self) -> PaginationVariables {
        PaginationVariables {
            first: Some(self.page_size),
            offset: Some(self.page_offset()),
            after: None,
        }
    }

    fn has_more(&self) -> bool {
        self.page
            .checked_mul(self.page_size)
            .is_some_and(|fetched| fetched < self.total_count)
    }

    fn set_page(&mut self, page: usize) {
        self.page = page;
    }

    fn record_fetch(&mut self, total_count: usize, count: usize, _page_info: Option<PageInfo>) {
        self.total_count = total_count;
        self.count = count;
    }

    fn recompute_page(&mut self) {
        self.page = self.count.div_ceil(self.page_size);
    }
}

/// Pagination based on `first`/`after` cursors
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CursorPagination {
    inner: OffsetPagination,
    page_info: PageInfo,
}

impl CursorPagination {
    pub fn new(options: PaginationOptions) -> crate::Result<Self> {
        Ok(Self {
            inner: OffsetPagination::new(options)?,
            page_info: PageInfo::default(),
        })
    }
}

impl Pagination for CursorPagination {
    fn mode(&self) -> PaginationMode {
        self.inner.mode()
    }

    fn page(&self) -> usize {
        self.inner.page()
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn total_count(&self) -> usize {
        self.inner.total_count()
    }

    fn page_info(&self) -> Option<&PageInfo> {
        Some(&self.page_info)
    }

    /// Cursor servers take no offset; the first page is just `first`.
    fn variables(&self) -> PaginationVariables {
        PaginationVariables {
            first: Some(self.inner.page_size()),
            offset: None,
            after: None,
        }
    }

    fn incremental_variables(&self) -> PaginationVariables {
        PaginationVariables {
            first: Some(self.inner.page_size()),
            offset: None,
            // nothing fetched yet: start from the beginning
            after: self.inner.count().checked_sub(1).map(CursorCodec::encode_offset),
        }
    }

    fn has_more(&self) -> bool {
        self.page_info.has_next()
    }

    fn set_page(&mut self, page: usize) {
        self.inner.set_page(page);
    }

    fn record_fetch(&mut self, total_count: usize, count: usize, page_info: Option<PageInfo>) {
        self.inner.record_fetch(total_count, count, None);
        if let Some(page_info) = page_info {
            self.page_info = page_info;
        }
    }

    fn recompute_page(&mut self) {
        self.inner.recompute_page();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_err;

    fn options(page: usize, page_size: usize, mode: PaginationMode) -> PaginationOptions {
        PaginationOptions {
            page,
            page_size,
            mode,
        }
    }

    #[test]
    fn test_defaults() {
        let pagination = OffsetPagination::default();
        assert_eq!(pagination.page(), 1);
        assert_eq!(pagination.page_size(), 30);
        assert_eq!(pagination.mode(), PaginationMode::Fetch);
        assert_eq!(pagination.count(), 0);
        assert_eq!(pagination.total_count(), 0);
    }

    #[test]
    fn test_options_validation() {
        assert_err!(OffsetPagination::new(options(0, 10, PaginationMode::Fetch)));
        assert_err!(CursorPagination::new(options(1, 0, PaginationMode::Fetch)));
    }

    #[test]
    fn test_options_from_config() {
        let parsed: PaginationOptions =
            serde_json::from_value(json!({ "pageSize": 5, "mode": "paged" })).unwrap();
        assert_eq!(parsed, options(1, 5, PaginationMode::Paged));
    }

    #[test]
    fn test_fetch_mode_variables_start_at_zero() {
        let mut pagination = OffsetPagination::new(options(3, 10, PaginationMode::Fetch)).unwrap();
        assert_eq!(pagination.variables().offset, Some(0));
        assert_eq!(pagination.variables().first, Some(10));

        pagination.set_page(4);
        assert_eq!(pagination.incremental_variables().offset, Some(30));
    }

    #[test]
    fn test_paged_mode_variables_follow_page() {
        let pagination = OffsetPagination::new(options(3, 10, PaginationMode::Paged)).unwrap();
        assert_eq!(
            Value::Object(pagination.variables().into_variables()),
            json!({ "first": 10, "offset": 20 })
        );
    }

    #[test]
    fn test_offset_has_more() {
        let mut pagination = OffsetPagination::new(options(1, 5, PaginationMode::Fetch)).unwrap();
        pagination.record_fetch(5, 5, None);
        assert!(!pagination.has_more());

        pagination.record_fetch(12, 5, None);
        assert!(pagination.has_more());
    }

    #[test]
    fn test_huge_page_saturates() {
        let mut pagination = OffsetPagination::new(options(1, 5, PaginationMode::Paged)).unwrap();
        pagination.record_fetch(12, 5, None);
        pagination.set_page(usize::MAX / 2);
        assert!(!pagination.has_more());
        assert_eq!(pagination.variables().offset, Some(usize::MAX));
        assert_eq!(pagination.incremental_variables().offset, Some(usize::MAX));
    }

    #[test]
    fn test_recompute_page() {
        let mut pagination = OffsetPagination::new(options(1, 5, PaginationMode::Fetch)).unwrap();
        pagination.record_fetch(7, 7, None);
        pagination.recompute_page();
        assert_eq!(pagination.page(), 2);

        pagination.record_fetch(7, 0, None);
        pagination.recompute_page();
        assert_eq!(pagination.page(), 0);
    }

    #[test]
    fn test_cursor_variables() {
        let mut pagination = CursorPagination::new(options(1, 10, PaginationMode::Fetch)).unwrap();
        assert_eq!(
            Value::Object(pagination.variables().into_variables()),
            json!({ "first": 10 })
        );
        assert_eq!(pagination.incremental_variables().after, None);

        pagination.record_fetch(40, 10, None);
        assert_eq!(
            pagination.incremental_variables().after,
            Some(CursorCodec::encode_offset(9))
        );
    }

    #[test]
    fn test_cursor_has_more_follows_page_info() {
        let mut pagination = CursorPagination::default();
        assert!(pagination.has_more());

        // counters alone never change has_more for cursors
        pagination.record_fetch(10, 10, None);
        assert!(pagination.has_more());

        pagination.record_fetch(
            10,
            10,
            Some(PageInfo {
                has_next_page: Some(false),
                ..PageInfo::default()
            }),
        );
        assert!(!pagination.has_more());
        assert_eq!(pagination.total_count(), 10);
    }
}
