//! Pagination types shared by list endpoints and repositories

use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 500;

/// Pagination parameters accepted as query-string arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageParams {
    /// Number of results to skip
    #[serde(default)]
    pub offset: u64,

    /// Maximum number of results to return
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageParams {
    /// Create pagination parameters
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Limit clamped to the service-wide ceiling
    pub fn clamped_limit(&self) -> u64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    /// Apply this page to an in-memory slice of results
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.offset as usize)
            .take(self.clamped_limit() as usize)
            .cloned()
            .collect()
    }
}

/// One page of results plus the total count for the query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    /// Assemble a page from sliced items and the pre-slice total
    pub fn new(items: Vec<T>, total: u64, params: PageParams) -> Self {
        Self {
            items,
            total,
            offset: params.offset,
            limit: params.clamped_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = PageParams::default();
        assert_eq!(params.offset, 0);
        assert_eq!(params.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(PageParams::new(0, 0).clamped_limit(), 1);
        assert_eq!(PageParams::new(0, 10_000).clamped_limit(), MAX_LIMIT);
        assert_eq!(PageParams::new(0, 25).clamped_limit(), 25);
    }

    #[test]
    fn test_slice() {
        let items: Vec<u32> = (0..10).collect();
        let page = PageParams::new(3, 4).slice(&items);
        assert_eq!(page, vec![3, 4, 5, 6]);

        let past_end = PageParams::new(20, 4).slice(&items);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_page_assembly() {
        let page = Page::new(vec![1, 2, 3], 12, PageParams::new(0, 3));
        assert_eq!(page.total, 12);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.limit, 3);
    }
}
