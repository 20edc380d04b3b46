//! Page requests and paginated results.

use crate::config::CoreConfig;
use crate::{CareError, CareResult};
use serde::Serialize;

/// A 1-based page number and a page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Builds a request from optional caller input.
    ///
    /// A missing page means the first page; a missing limit means the configured default.
    /// Limits above the configured maximum are clamped to it.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] if `page` or `limit` is zero.
    pub fn new(page: Option<u32>, limit: Option<u32>, cfg: &CoreConfig) -> CareResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(CareError::invalid("page numbers start at 1"));
        }
        let limit = limit.unwrap_or(cfg.default_page_limit());
        if limit == 0 {
            return Err(CareError::invalid("page limit must be at least 1"));
        }

        Ok(Self {
            page,
            limit: limit.min(cfg.max_page_limit()),
        })
    }

    pub fn first(cfg: &CoreConfig) -> Self {
        Self {
            page: 1,
            limit: cfg.default_page_limit(),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    /// Slices an already-sorted sequence down to this page.
    pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect()
    }
}

/// One page of results plus the totals needed to render pagination controls.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: usize) -> Self {
        Self {
            items,
            page: request.page,
            limit: request.limit,
            total,
            pages: total.div_ceil(request.limit as usize),
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
            pages: self.pages,
        }
    }
}
