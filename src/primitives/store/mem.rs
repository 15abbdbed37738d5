use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{PageImage, PageStore};
use crate::types::{PageId, Result, TxnError};

/// In-memory [`PageStore`] keyed by head page.
///
/// Multi-page runs are stored whole under their head page, so a `get` of the
/// head returns the full run.
#[derive(Default)]
pub struct MemStore {
    pages: RwLock<HashMap<PageId, Arc<[u8]>>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `id` with `data`, replacing any previous contents.
    pub fn insert(&self, id: PageId, data: impl Into<Arc<[u8]>>) {
        self.pages.write().insert(id, data.into());
    }

    /// Returns true if `id` has contents.
    pub fn contains(&self, id: PageId) -> bool {
        self.pages.read().contains_key(&id)
    }

    /// Number of stored page runs.
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

impl PageStore for MemStore {
    fn get(&self, id: PageId) -> Result<PageImage> {
        self.pages
            .read()
            .get(&id)
            .map(|data| PageImage::new(id, Arc::clone(data)))
            .ok_or(TxnError::NotFound(id))
    }

    fn put(&self, id: PageId, data: &[u8]) -> Result<()> {
        self.pages.write().insert(id, Arc::from(data));
        Ok(())
    }
}
