use tracing::{debug, trace, warn};

use super::table::{CowPage, Rejected};
use super::transaction::Transaction;
use crate::primitives::store::PageImage;
use crate::types::{
    page::{span_bytes, span_count, PAGE_SIZE},
    PageId, Result, TxnError,
};

enum PageBytes<'t> {
    Private(&'t [u8]),
    Store(PageImage),
}

/// Read view of a page as the transaction sees it.
pub struct PageRef<'t> {
    /// Page identifier.
    pub id: PageId,
    /// Byte length of the record headed by this page.
    pub overflow_size: u32,
    bytes: PageBytes<'t>,
}

impl<'t> PageRef<'t> {
    /// Returns the page data as a byte slice.
    pub fn data(&self) -> &[u8] {
        match &self.bytes {
            PageBytes::Private(bytes) => bytes,
            PageBytes::Store(image) => image.data(),
        }
    }

    /// Returns true if the bytes are this transaction's private copy rather
    /// than the store's pristine image.
    pub fn is_private(&self) -> bool {
        matches!(self.bytes, PageBytes::Private(_))
    }
}

/// Write view of a transaction-private page copy.
pub struct PageMut<'t> {
    /// Page identifier.
    pub id: PageId,
    /// Byte length of the record headed by this page.
    pub overflow_size: u32,
    data: &'t mut [u8],
}

impl<'t> PageMut<'t> {
    fn new(page: &'t mut CowPage) -> Self {
        let (id, overflow_size) = (page.id(), page.overflow_size());
        Self {
            id,
            overflow_size,
            data: page.data_mut(),
        }
    }

    /// Returns the page data as an immutable byte slice.
    pub fn data(&self) -> &[u8] {
        &*self.data
    }

    /// Returns the page data as a mutable byte slice.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub(super) fn into_data(self) -> &'t mut [u8] {
        self.data
    }
}

impl Transaction {
    /// Reads a page.
    ///
    /// A page this transaction already copied is served from the copy with no
    /// I/O. Anything else comes from the store and is returned as is; reading
    /// never creates a private copy.
    pub fn get(&self, id: PageId) -> Result<PageRef<'_>> {
        let table = self.table_ref()?;
        if let Some(page) = table.lookup(id) {
            trace!(page = id.0, "txn.get.tracked");
            return Ok(PageRef {
                id,
                overflow_size: page.overflow_size(),
                bytes: PageBytes::Private(page.data()),
            });
        }
        let image = self.store.get(id)?;
        let overflow_size = self.resolve_overflow_size(id)?;
        trace!(page = id.0, overflow_size, "txn.get.store");
        Ok(PageRef {
            id,
            overflow_size,
            bytes: PageBytes::Store(image),
        })
    }

    /// Shorthand for [`modify`](Self::modify) with the size taken from the
    /// page's metadata.
    pub fn modify_page(&mut self, id: PageId) -> Result<PageMut<'_>> {
        self.modify(id, 0)
    }

    /// Returns a private, writable copy of a page.
    ///
    /// The first call copies the page (and the rest of the record it heads)
    /// out of the store; later calls return the same copy. A non-zero
    /// `requested_overflow_size` sizes the copy instead of the page's
    /// metadata record.
    pub fn modify(&mut self, id: PageId, requested_overflow_size: u32) -> Result<PageMut<'_>> {
        self.ensure_writable()?;
        if let Some(idx) = self.table_ref()?.find(id) {
            return self.tracked_mut(idx);
        }

        let mut original = self.store.get(id)?;
        let overflow_size = match requested_overflow_size {
            0 => match self.resolve_overflow_size(id)? {
                0 => PAGE_SIZE as u32,
                size => size,
            },
            size => size,
        };
        let pages = span_count(overflow_size);
        let len = span_bytes(pages);
        if original.len() < len {
            original = self.store.get_run(id, pages)?;
        }

        let mut buf = self.alloc.allocate(len)?;
        // Never read past the image the store handed out; a short run leaves
        // the tail of the copy zeroed.
        let copied = len.min(original.len());
        buf[..copied].copy_from_slice(&original.data()[..copied]);
        drop(original);

        let page = CowPage::new(id, overflow_size, buf);
        let registered = match self.table.as_mut() {
            Some(table) => table.insert(page),
            None => Err(Rejected {
                error: TxnError::Invalid("transaction is closed"),
                page,
            }),
        };
        if let Err(rejected) = registered {
            let (error, page) = rejected.into_parts();
            self.alloc.release(page.into_buffer());
            warn!(page = id.0, error = %error, "txn.modify.register_failed");
            return Err(error);
        }
        debug!(page = id.0, pages, overflow_size, copied, "txn.modify.cow");

        let idx = self
            .table_ref()?
            .find(id)
            .ok_or(TxnError::Corruption("registered page missing from table"))?;
        self.tracked_mut(idx)
    }

    fn tracked_mut(&mut self, idx: usize) -> Result<PageMut<'_>> {
        self.table
            .as_mut()
            .and_then(|table| table.slot_mut(idx))
            .map(PageMut::new)
            .ok_or(TxnError::Invalid("transaction is closed"))
    }
}
