use std::future::Future;

use chrono::{DateTime, Utc};
use super::cursor::{Cursor, InvalidCursor};

/// Largest page a listing returns; also the fallback for out-of-range requests.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing key. Rows are listed in descending order of this key; `sequence`
/// breaks ties between rows sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub created_at: DateTime<Utc>,
    pub sequence: i64,
}

/// A row that can be listed by keyset.
pub trait Keyed {
    fn position(&self) -> Position;
}

/// Which rows a page may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// First page: everything.
    Unbounded,
    /// Resumed page: rows strictly older than the given key.
    Before(Position),
}

impl Bound {
    pub fn admits(&self, position: &Position) -> bool {
        match self {
            Bound::Unbounded => true,
            Bound::Before(last) => position < last,
        }
    }

    pub fn before(&self) -> Option<Position> {
        match self {
            Bound::Unbounded => None,
            Bound::Before(last) => Some(*last),
        }
    }
}

/// Clamp a caller-requested page size to `1..=MAX_PAGE_SIZE`.
///
/// Non-positive or oversized requests fall back to `MAX_PAGE_SIZE`.
pub fn page_size(requested: i64) -> u32 {
    match u32::try_from(requested) {
        Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
        _ => MAX_PAGE_SIZE,
    }
}

/// One call of a paged listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Filter identifiers, in the order the caller sent them.
    pub filters: Vec<i64>,
    /// Token from the previous page; `None` (or empty) starts from the newest row.
    pub cursor: Option<String>,
    /// Requested page size, clamped by [`page_size`].
    pub limit: i64,
}

impl PageRequest {
    /// Resolve the cursor into a bound. A present token must decode and match
    /// `filters`; it is never ignored.
    pub fn bound(&self) -> Result<Bound, InvalidCursor> {
        match self.cursor.as_deref() {
            None | Some("") => Ok(Bound::Unbounded),
            Some(token) => Cursor::resume(token, &self.filters).map(Bound::Before),
        }
    }

    pub fn page_size(&self) -> u32 {
        page_size(self.limit)
    }
}

/// One page of results, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present only when the page is full, i.e. more rows may exist.
    pub next_cursor: Option<String>,
}

impl<T: Keyed> Page<T> {
    /// Build a page from rows fetched with `LIMIT page_size`.
    pub fn from_rows(mut rows: Vec<T>, page_size: u32, filters: &[i64]) -> Self {
        let page_size = page_size as usize;
        rows.truncate(page_size);

        let next_cursor = if page_size > 0 && rows.len() == page_size {
            rows.last()
                .map(|last| Cursor::new(last.position(), filters.to_vec()).encode())
        } else {
            None
        };

        Self {
            items: rows,
            next_cursor,
        }
    }
}

/// Run one keyset listing call.
///
/// `fetch` receives the bound and page size and must return at most that many
/// rows admitted by the bound, newest first.
pub async fn list_page<T, E, F, Fut>(request: &PageRequest, fetch: F) -> Result<Page<T>, E>
where
    T: Keyed,
    E: From<InvalidCursor>,
    F: FnOnce(Bound, u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let bound = request.bound()?;
    let size = request.page_size();
    let rows = fetch(bound, size).await?;
    Ok(Page::from_rows(rows, size, &request.filters))
}
