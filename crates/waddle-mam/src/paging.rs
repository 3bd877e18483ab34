//! Cursor paging over an ordered result sequence (XEP-0059 semantics).
//!
//! The input sequence is in archive order, oldest first. A request selects a
//! window of at most `max` elements:
//!
//! - no cursor: the first `max` elements
//! - `after=id`: the `max` elements following `id`
//! - `before=id`: the `max` elements preceding `id`
//! - `before` without id: the last `max` elements
//! - `index=n`: the `max` elements starting at offset `n`
//!
//! Anchors are matched by identity, never by comparing id values.

use serde::Serialize;

use crate::MamError;

/// Page size used when the request does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: usize = 250;

/// Where a page starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageCursor {
    /// Beginning of the sequence
    #[default]
    First,
    /// Elements after the anchor id
    After(String),
    /// Elements before the anchor id
    Before(String),
    /// End of the sequence
    Last,
    /// Offset into the sequence
    Index(usize),
}

/// A paging request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested page size, clamped by [`PageRequest::page_size`]
    pub max: Option<usize>,
    pub cursor: PageCursor,
}

impl PageRequest {
    /// Request the first page.
    pub fn first(max: Option<usize>) -> Self {
        Self {
            max,
            cursor: PageCursor::First,
        }
    }

    /// Request the page following `id`.
    pub fn after(max: Option<usize>, id: impl Into<String>) -> Self {
        Self {
            max,
            cursor: PageCursor::After(id.into()),
        }
    }

    /// Request the page preceding `id`.
    pub fn before(max: Option<usize>, id: impl Into<String>) -> Self {
        Self {
            max,
            cursor: PageCursor::Before(id.into()),
        }
    }

    /// Request the last page.
    pub fn last(max: Option<usize>) -> Self {
        Self {
            max,
            cursor: PageCursor::Last,
        }
    }

    /// Request the page starting at offset `index`.
    pub fn index(max: Option<usize>, index: usize) -> Self {
        Self {
            max,
            cursor: PageCursor::Index(index),
        }
    }

    /// Effective page size: `max` clamped to `1..=250`, 50 when unset.
    pub fn page_size(&self) -> usize {
        self.max
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// Paging summary returned with a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageResult {
    /// Id reported as the first element
    pub first: Option<String>,
    /// Offset of the reported first element in the full sequence
    pub first_index: Option<usize>,
    /// Id reported as the last element
    pub last: Option<String>,
    /// Number of elements in the page
    pub count: usize,
    /// Whether the page reaches the end of the sequence in the browsing direction
    pub complete: bool,
}

/// A selected window and its summary.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub result: PageResult,
}

impl<T> Page<T> {
    /// Reverse the page and swap its first/last markers.
    ///
    /// The set of elements is unchanged.
    pub fn flip(mut self) -> Self {
        self.items.reverse();
        std::mem::swap(&mut self.result.first, &mut self.result.last);
        if let Some(index) = self.result.first_index {
            self.result.first_index = Some(index + self.result.count.saturating_sub(1));
        }
        self
    }
}

/// Select the page described by `request` from `items`.
///
/// Fails with item-not-found when an anchor is not part of `items` or when
/// an index points past the end.
pub fn select_page<T, F>(items: Vec<T>, request: &PageRequest, id_of: F) -> Result<Page<T>, MamError>
where
    F: Fn(&T) -> &str,
{
    let max = request.page_size();
    let len = items.len();

    let position = |id: &str| -> Result<usize, MamError> {
        items
            .iter()
            .position(|item| id_of(item) == id)
            .ok_or_else(|| MamError::item_not_found(format!("Page anchor {} not found", id)))
    };

    let (start, end, complete) = match &request.cursor {
        PageCursor::First => {
            let end = max.min(len);
            (0, end, end == len)
        }
        PageCursor::After(id) => {
            let start = position(id)? + 1;
            let end = (start + max).min(len);
            (start, end, end == len)
        }
        PageCursor::Before(id) => {
            let end = position(id)?;
            let start = end.saturating_sub(max);
            (start, end, start == 0)
        }
        PageCursor::Last => {
            let start = len.saturating_sub(max);
            (start, len, start == 0)
        }
        PageCursor::Index(index) => {
            let index = *index;
            if index > len || (index == len && len > 0) {
                return Err(MamError::item_not_found(format!(
                    "Page index {} out of range",
                    index
                )));
            }
            let end = (index + max).min(len);
            (index, end, end == len)
        }
    };

    let items: Vec<T> = items
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect();

    let result = PageResult {
        first: items.first().map(|item| id_of(item).to_string()),
        first_index: (!items.is_empty()).then_some(start),
        last: items.last().map(|item| id_of(item).to_string()),
        count: items.len(),
        complete,
    };

    Ok(Page { items, result })
}
