//! Offset pagination shared by every search operation.

use serde::{Deserialize, Serialize};

/// Requested page (0-based) and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 50 }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Clamp the page size into `1..=max_size`.
    pub fn clamped(self, max_size: u32) -> Self {
        Self {
            page: self.page,
            size: self.size.clamp(1, max_size.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// One page of results plus totals across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total_elements: u64,
    pub total_pages: u64,
    pub page: u32,
    pub content_size: u32,
    pub content: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total_elements: u64, content: Vec<T>) -> Self {
        let size = u64::from(request.size.max(1));
        Self {
            total_elements,
            total_pages: total_elements.div_ceil(size),
            page: request.page,
            content_size: u32::try_from(content.len()).unwrap_or(u32::MAX),
            content,
        }
    }

    /// Slice an already filtered and ordered result set (in-memory backends).
    pub fn from_sorted(request: PageRequest, all: Vec<T>) -> Self {
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(request.limit()).unwrap_or(usize::MAX);
        let content = all.into_iter().skip(offset).take(limit).collect();
        Self::new(request, total, content)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            page: self.page,
            content_size: self.content_size,
            content: self.content.into_iter().map(f).collect(),
        }
    }
}
