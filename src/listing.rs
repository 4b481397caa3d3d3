//! Incremental, offset-paged list state for the users view.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::endpoint::{BoxedEndpointFuture, EndpointError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListingOptions {
    pub page_size: usize,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

/// Backend of a scoped list, e.g. the users of one organization.
pub trait PageSource<T>: Send + Sync {
    fn count<'a>(&'a self, scope: &'a str) -> BoxedEndpointFuture<'a, u64>;
    fn page<'a>(
        &'a self,
        scope: &'a str,
        offset: usize,
        limit: usize,
    ) -> BoxedEndpointFuture<'a, Vec<T>>;
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ListError {
    #[error("no scope selected")]
    NoScope,
    #[error(transparent)]
    Fetch(#[from] EndpointError),
}

pub type ListResult<T> = Result<T, ListError>;

pub struct PagedList<T> {
    source: Arc<dyn PageSource<T>>,
    page_size: usize,
    scope: Option<String>,
    items: Vec<T>,
    /// `None` while the count is unknown.
    total: Option<u64>,
    has_more: bool,
    error: Option<EndpointError>,
}

impl<T> PagedList<T> {
    pub fn new(source: Arc<dyn PageSource<T>>, options: ListingOptions) -> Self {
        Self {
            source,
            page_size: options.page_size.max(1),
            scope: None,
            items: Vec::new(),
            total: None,
            has_more: false,
            error: None,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&EndpointError> {
        self.error.as_ref()
    }

    /// Switches to another scope and reloads from the first page.
    pub async fn select_scope(&mut self, scope: impl Into<String>) -> ListResult<usize> {
        self.scope = Some(scope.into());
        self.reset();
        self.load_first().await
    }

    /// Fetches the count, then the first page. A failed count leaves the
    /// total unknown; a failed page clears the list.
    pub async fn load_first(&mut self) -> ListResult<usize> {
        let scope = self.scope.clone().ok_or(ListError::NoScope)?;
        self.total = match self.source.count(&scope).await {
            Ok(total) => Some(total),
            Err(error) => {
                tracing::warn!(%scope, %error, "count unavailable, paging until a short page");
                None
            }
        };
        self.items.clear();
        self.fetch(&scope).await
    }

    pub async fn load_more(&mut self) -> ListResult<usize> {
        if !self.has_more {
            return Ok(0);
        }
        let scope = self.scope.clone().ok_or(ListError::NoScope)?;
        self.fetch(&scope).await
    }

    /// Retry action of the fetch error notice.
    pub async fn retry(&mut self) -> ListResult<usize> {
        self.load_first().await
    }

    async fn fetch(&mut self, scope: &str) -> ListResult<usize> {
        let offset = self.items.len();
        match self.source.page(scope, offset, self.page_size).await {
            Ok(page) => {
                let fetched = page.len();
                self.error = None;
                self.items.extend(page);
                self.has_more = match self.total {
                    Some(total) => ((offset + fetched) as u64) < total,
                    None => fetched == self.page_size,
                };
                tracing::debug!(scope, offset, fetched, has_more = self.has_more, "page loaded");
                Ok(fetched)
            }
            Err(error) => {
                tracing::warn!(scope, offset, %error, "page fetch failed");
                self.reset();
                self.error = Some(error.clone());
                Err(error.into())
            }
        }
    }

    fn reset(&mut self) {
        self.items.clear();
        self.total = None;
        self.has_more = false;
        self.error = None;
    }
}

/// Scope to show: an explicitly requested one wins, then the current one if
/// it still exists, then the first available.
pub fn pick_scope<'a>(
    requested: Option<&'a str>,
    current: Option<&'a str>,
    available: &'a [String],
) -> Option<&'a str> {
    if let Some(requested) = requested.filter(|requested| !requested.is_empty()) {
        return Some(requested);
    }
    if let Some(current) = current.filter(|current| available.iter().any(|id| id == current)) {
        return Some(current);
    }
    available.first().map(String::as_str)
}
