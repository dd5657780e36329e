//! Keyset (cursor) pagination for newest-first listings.
//!
//! A listing resumes from the `(created_at, sequence)` key of the last row it
//! returned instead of a numeric offset, so rows inserted concurrently at the
//! head of the list never shift or duplicate later pages.
//!
//! The cursor handed to callers is opaque: base64 over a small JSON document
//! carrying the last key and the exact filter list the page was produced
//! under. Resuming with a different filter list is rejected.

pub mod cursor;
pub mod keyset;

pub use cursor::{Cursor, InvalidCursor};
pub use keyset::{list_page, page_size, Bound, Keyed, Page, PageRequest, Position, MAX_PAGE_SIZE};
