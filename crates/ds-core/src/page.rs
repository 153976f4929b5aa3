//! # Client-Side Pagination
//!
//! Search results are merged from per-table fetches, so the page window is
//! cut locally after the merge.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// 1-based page request. Zero values fall back to page 1 / [`DEFAULT_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: if self.page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                self.page_size
            },
        }
    }

    /// Index of the first item on this page.
    pub fn offset(&self) -> usize {
        let p = self.normalized();
        (p.page as usize - 1).saturating_mul(p.page_size as usize)
    }
}

/// Pagination echoed back with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEcho {
    pub page: u32,
    pub page_size: u32,
    /// Items collected before slicing. Bounded by the per-table fetch cap,
    /// so this is not a global match count.
    pub total: usize,
}

/// Cut the `[(page-1)*size, (page-1)*size + size)` window out of `items`,
/// clamped to its bounds. A start past the end yields an empty page.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Vec<T> {
    let request = request.normalized();
    let start = request.offset();
    if start >= items.len() {
        return Vec::new();
    }
    items
        .into_iter()
        .skip(start)
        .take(request.page_size as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_page_of_twenty_five() {
        let items: Vec<usize> = (0..25).collect();
        let page = paginate(items, PageRequest::new(2, 10));
        assert_eq!(page, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let items: Vec<usize> = (0..25).collect();
        assert!(paginate(items, PageRequest::new(4, 10)).is_empty());
    }

    #[test]
    fn test_last_page_is_clamped() {
        let items: Vec<usize> = (0..25).collect();
        assert_eq!(paginate(items, PageRequest::new(3, 10)), vec![20, 21, 22, 23, 24]);
    }

    #[test]
    fn test_zero_values_fall_back() {
        let req = PageRequest { page: 0, page_size: 0 }.normalized();
        assert_eq!(req, PageRequest::default());
        assert_eq!(req.offset(), 0);
        let items: Vec<usize> = (0..3).collect();
        assert_eq!(paginate(items, PageRequest { page: 0, page_size: 0 }), vec![0, 1, 2]);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let items: Vec<usize> = (0..5).collect();
        assert!(paginate(items, PageRequest::new(u32::MAX, u32::MAX)).is_empty());
    }
}
