use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::table::PageTable;
use crate::options::TxnOptions;
use crate::primitives::alloc::{HeapAllocator, PageAllocator};
use crate::primitives::store::PageStore;
use crate::types::{Result, TxnError};

/// Access flags a transaction is created with.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct TxnFlags(u32);

impl TxnFlags {
    /// Pages may be read.
    pub const READ: TxnFlags = TxnFlags(1 << 0);
    /// Pages may be modified.
    pub const WRITE: TxnFlags = TxnFlags(1 << 1);
    /// Read and write access.
    pub const READ_WRITE: TxnFlags = TxnFlags(Self::READ.0 | Self::WRITE.0);

    /// Builds flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        TxnFlags(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: TxnFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TxnFlags {
    type Output = TxnFlags;

    fn bitor(self, rhs: TxnFlags) -> TxnFlags {
        TxnFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for TxnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnFlags({:#x})", self.0)
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Pages can be read and modified.
    Active,
    /// The working set was written to the store; reads still work.
    Committed,
    /// The working set was released; only `close` is accepted.
    Closed,
}

/// A transaction's private view of the page store.
///
/// Every page modified through the transaction gets its own copy, tracked in
/// a [`PageTable`] until [`Transaction::commit`] writes the copies back or
/// [`Transaction::close`] throws them away. Dropping a transaction closes it.
///
/// ```
/// use std::sync::Arc;
/// use cowtxn::primitives::store::MemStore;
/// use cowtxn::txn::{format_metadata_page, Transaction, TxnFlags};
/// use cowtxn::types::{page::PAGE_SIZE, PageId};
///
/// let store = Arc::new(MemStore::new());
/// let mut meta = vec![0u8; PAGE_SIZE];
/// format_metadata_page(&mut meta)?;
/// store.insert(PageId(0), meta);
/// store.insert(PageId(1), vec![0u8; PAGE_SIZE]);
///
/// let mut tx = Transaction::begin(store.clone(), TxnFlags::READ_WRITE)?;
/// tx.modify_page(PageId(1))?.data_mut()[0] = 42;
/// tx.commit()?;
/// tx.close()?;
/// # Ok::<(), cowtxn::TxnError>(())
/// ```
pub struct Transaction {
    pub(super) store: Arc<dyn PageStore>,
    pub(super) alloc: Arc<dyn PageAllocator>,
    pub(super) table: Option<PageTable>,
    flags: TxnFlags,
    state: TxnState,
}

impl Transaction {
    /// Starts a transaction with the heap allocator and default options.
    pub fn begin(store: Arc<dyn PageStore>, flags: TxnFlags) -> Result<Self> {
        Self::with_options(store, Arc::new(HeapAllocator), flags, TxnOptions::default())
    }

    /// Starts a transaction with explicit collaborators and options.
    pub fn with_options(
        store: Arc<dyn PageStore>,
        alloc: Arc<dyn PageAllocator>,
        flags: TxnFlags,
        options: TxnOptions,
    ) -> Result<Self> {
        options.validate()?;
        let table = PageTable::new(options.initial_buckets)?;
        let table = table.with_bucket_limit(options.max_table_buckets);
        let buckets = table.bucket_count();
        debug!(flags = flags.bits(), buckets, "txn.begin");
        Ok(Self {
            store,
            alloc,
            table: Some(table),
            flags,
            state: TxnState::Active,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Flags the transaction was created with.
    pub fn flags(&self) -> TxnFlags {
        self.flags
    }

    /// Number of pages with a private copy.
    pub fn tracked_pages(&self) -> usize {
        self.table.as_ref().map_or(0, PageTable::len)
    }

    /// Bucket count of the working-set table (0 once closed).
    pub fn bucket_count(&self) -> usize {
        self.table.as_ref().map_or(0, PageTable::bucket_count)
    }

    /// The working-set table, until the transaction is closed.
    pub fn table(&self) -> Option<&PageTable> {
        self.table.as_ref()
    }

    pub(super) fn table_ref(&self) -> Result<&PageTable> {
        self.table
            .as_ref()
            .ok_or(TxnError::Invalid("transaction is closed"))
    }

    pub(super) fn ensure_writable(&self) -> Result<()> {
        match self.state {
            TxnState::Closed => Err(TxnError::Invalid("transaction is closed")),
            TxnState::Committed => Err(TxnError::Invalid("transaction already committed")),
            TxnState::Active if !self.flags.contains(TxnFlags::WRITE) => {
                Err(TxnError::Invalid("transaction is read-only"))
            }
            TxnState::Active => Ok(()),
        }
    }

    /// Writes every private copy to the store and releases it.
    ///
    /// Pages are written in table order. The first failed write stops the
    /// commit: the pages already written are released, the rest stay tracked
    /// and the transaction stays active, so the caller must still
    /// [`close`](Self::close) it.
    pub fn commit(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let alloc = Arc::clone(&self.alloc);
        let table = self
            .table
            .as_mut()
            .ok_or(TxnError::Invalid("transaction is closed"))?;
        let written = table.drain(alloc.as_ref(), |page| store.put(page.id(), page.data()));
        match written {
            Ok(pages) => {
                self.state = TxnState::Committed;
                debug!(pages, "txn.commit.complete");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, remaining = table.len(), "txn.commit.failed");
                Err(err)
            }
        }
    }

    /// Discards every private copy without writing it.
    ///
    /// Closing an already closed transaction does nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut table) = self.table.take() else {
            return Ok(());
        };
        let released = table.drain(self.alloc.as_ref(), |_| Ok(()))?;
        self.state = TxnState::Closed;
        debug!(released, "txn.close");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Close drains into a sink that never fails.
        let _ = self.close();
    }
}
