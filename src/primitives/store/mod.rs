#![forbid(unsafe_code)]

//! Durable page store contract consumed by transactions.

mod file;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

use std::sync::Arc;

use crate::types::{PageId, Result};

/// Pristine page image as returned by a [`PageStore`].
///
/// The bytes are shared with the store; transactions copy them before
/// writing.
#[derive(Clone, Debug)]
pub struct PageImage {
    /// Page identifier.
    pub id: PageId,
    data: Arc<[u8]>,
}

impl PageImage {
    /// Wraps shared page bytes.
    pub fn new(id: PageId, data: Arc<[u8]>) -> Self {
        Self { id, data }
    }

    /// Returns the page data as a byte slice.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes available in this image.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Storage the transaction reads pristine pages from and persists pages to.
pub trait PageStore: Send + Sync {
    /// Fetches the page headed by `id`.
    ///
    /// Fails with [`crate::TxnError::NotFound`] when the page does not exist.
    fn get(&self, id: PageId) -> Result<PageImage>;

    /// Fetches up to `pages` contiguous units starting at `id`.
    ///
    /// Stores that cannot read past a single page may return less than was
    /// asked for; callers never read beyond the returned image.
    fn get_run(&self, id: PageId, _pages: u32) -> Result<PageImage> {
        self.get(id)
    }

    /// Persists `data` as the contents of `id` (and the units following it
    /// when `data` spans more than one page).
    fn put(&self, id: PageId, data: &[u8]) -> Result<()>;
}
