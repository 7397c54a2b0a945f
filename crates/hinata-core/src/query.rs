//! Shared query primitives: sort direction, pagination, date ranges, and
//! the paged result envelope used by every store's search entry point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction for search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Offset/limit pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "Pagination::default_limit")]
    pub limit: usize,
}

impl Pagination {
    const DEFAULT_LIMIT: usize = 50;

    fn default_limit() -> usize {
        Self::DEFAULT_LIMIT
    }

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// First `limit` items
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Half-open or closed date range; `None` bounds are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if instant < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if instant > end {
                return false;
            }
        }
        true
    }
}

/// One page of results plus the pre-pagination total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matches before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Slice a full, already-sorted result set down to one page.
    pub fn slice(mut items: Vec<T>, pagination: Pagination) -> Self {
        let total = items.len();
        let tail = if pagination.offset >= total {
            Vec::new()
        } else {
            items.drain(..pagination.offset);
            items.truncate(pagination.limit);
            items
        };
        Self {
            items: tail,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_range_contains() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap();
        let range = DateRange::new(Some(start), Some(end));

        assert!(range.contains(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()));
        assert!(range.contains(start));
        assert!(!range.contains(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()));

        let open = DateRange::since(start);
        assert!(open.contains(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
        assert!(!open.contains(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_page_slice() {
        let page = Page::slice((0..10).collect(), Pagination::new(3, 4));
        assert_eq!(page.items, vec![3, 4, 5, 6]);
        assert_eq!(page.total, 10);
        assert!(page.has_more());

        let last = Page::slice((0..10).collect(), Pagination::new(8, 4));
        assert_eq!(last.items, vec![8, 9]);
        assert!(!last.has_more());
    }

    #[test]
    fn test_page_slice_offset_past_end() {
        let page: Page<i32> = Page::slice(vec![1, 2, 3], Pagination::new(10, 5));
        assert!(page.is_empty());
        assert_eq!(page.total, 3);
        assert!(!page.has_more());
    }
}
