use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{PageImage, PageStore};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{
    page::{span_bytes, PAGE_SIZE},
    PageId, Result, TxnError,
};

/// [`PageStore`] laying pages out back to back in a single file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`.
pub struct FileStore {
    io: Arc<dyn FileIo>,
}

impl FileStore {
    /// Opens (or creates) the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_io(Arc::new(StdFileIo::open(path)?)))
    }

    /// Uses an existing I/O backend.
    pub fn with_io(io: Arc<dyn FileIo>) -> Self {
        Self { io }
    }

    /// Number of whole pages currently in the file.
    pub fn page_count(&self) -> Result<u64> {
        Ok(self.io.len()? / PAGE_SIZE as u64)
    }

    /// Flushes written pages to the device.
    pub fn sync(&self) -> Result<()> {
        self.io.sync_all()
    }

    fn offset_of(id: PageId) -> Result<u64> {
        id.0.checked_mul(PAGE_SIZE as u64)
            .ok_or(TxnError::Invalid("page offset overflow"))
    }
}

impl PageStore for FileStore {
    fn get(&self, id: PageId) -> Result<PageImage> {
        self.get_run(id, 1)
    }

    fn get_run(&self, id: PageId, pages: u32) -> Result<PageImage> {
        let off = Self::offset_of(id)?;
        let available = self.io.len()?.saturating_sub(off) / PAGE_SIZE as u64;
        if available == 0 {
            return Err(TxnError::NotFound(id));
        }
        let pages = available.min(u64::from(pages.max(1))) as u32;
        let mut buf = vec![0u8; span_bytes(pages)];
        self.io.read_at(off, &mut buf)?;
        debug!(page = id.0, pages, "store.file.read");
        Ok(PageImage::new(id, Arc::from(buf)))
    }

    fn put(&self, id: PageId, data: &[u8]) -> Result<()> {
        let off = Self::offset_of(id)?;
        self.io.write_at(off, data)?;
        debug!(page = id.0, bytes = data.len(), "store.file.write");
        Ok(())
    }
}
