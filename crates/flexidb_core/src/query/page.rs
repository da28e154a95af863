//! Pagination descriptors and page results.

use serde::Serialize;
use thiserror::Error;

/// Invalid pagination input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// Row window in result order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub offset: u64,
    pub limit: u32,
}

impl Window {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// First `limit` rows.
    pub fn first(limit: u32) -> Self {
        Self::new(0, limit)
    }
}

/// Zero-based page index plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pageable {
    page: u32,
    size: u32,
}

impl Pageable {
    /// # Errors
    /// - `ZeroPageSize` when `size == 0`.
    pub fn new(page: u32, size: u32) -> Result<Self, PaginationError> {
        if size == 0 {
            return Err(PaginationError::ZeroPageSize);
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn limit(&self) -> u32 {
        self.size
    }

    /// Rows skipped before this page; computed in `u64` so it cannot overflow.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn window(&self) -> Window {
        Window::new(self.offset(), self.size)
    }

    /// Following page; saturates at the last representable index.
    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            size: self.size,
        }
    }

    pub fn first(&self) -> Self {
        Self {
            page: 0,
            size: self.size,
        }
    }
}

/// One page of query results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<E> {
    content: Vec<E>,
    total_elements: u64,
    pageable: Pageable,
}

impl<E> Page<E> {
    pub fn new(content: Vec<E>, pageable: Pageable, total_elements: u64) -> Self {
        Self {
            content,
            total_elements,
            pageable,
        }
    }

    pub fn content(&self) -> &[E] {
        &self.content
    }

    pub fn into_content(self) -> Vec<E> {
        self.content
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn pageable(&self) -> Pageable {
        self.pageable
    }

    pub fn number(&self) -> u32 {
        self.pageable.page
    }

    pub fn size(&self) -> u32 {
        self.pageable.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(u64::from(self.pageable.size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.pageable.page) + 1 < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.pageable.page > 0
    }

    pub fn is_first(&self) -> bool {
        !self.has_previous()
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    /// Converts the content, keeping paging metadata.
    pub fn map<U, F: FnMut(E) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            pageable: self.pageable,
        }
    }
}
