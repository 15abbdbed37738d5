//! Open-addressing table of the pages a transaction has copied.
//!
//! Keys are page numbers, values own their copy-on-write buffer. Collisions
//! are resolved by linear probing. Entries are never removed one by one; the
//! table is only drained as a whole when the transaction ends, so the first
//! empty slot on a probe path always terminates a lookup.

use std::fmt;
use std::mem;

use tracing::{debug, trace, warn};

use crate::primitives::alloc::PageAllocator;
use crate::types::{PageId, Result, TxnError};

/// Transaction-private copy of a page.
pub struct CowPage {
    id: PageId,
    overflow_size: u32,
    buf: Box<[u8]>,
}

impl CowPage {
    /// Bundles a page number with the buffer holding its private copy.
    pub fn new(id: PageId, overflow_size: u32, buf: Box<[u8]>) -> Self {
        Self {
            id,
            overflow_size,
            buf,
        }
    }

    /// Page number this copy belongs to.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Byte length of the record headed by this page.
    pub fn overflow_size(&self) -> u32 {
        self.overflow_size
    }

    /// Contents of the copy.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Writable contents of the copy.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Gives up the buffer, typically to return it to its allocator.
    pub fn into_buffer(self) -> Box<[u8]> {
        self.buf
    }
}

impl fmt::Debug for CowPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CowPage")
            .field("id", &self.id)
            .field("overflow_size", &self.overflow_size)
            .field("len", &self.buf.len())
            .finish()
    }
}

/// A failed insert. The page is handed back so its buffer can be released.
#[derive(Debug)]
pub struct Rejected {
    /// Why the page was not registered.
    pub error: TxnError,
    /// The page that was offered to the table.
    pub page: CowPage,
}

impl Rejected {
    /// Splits the rejection into the error and the returned page.
    pub fn into_parts(self) -> (TxnError, CowPage) {
        (self.error, self.page)
    }
}

enum Placement {
    Placed(usize),
    Duplicate(CowPage),
    Full(CowPage),
}

enum Growth {
    Grown,
    Refused { bytes: usize },
    Failed(PageId),
}

/// Working-set table of a single transaction.
pub struct PageTable {
    slots: Vec<Option<CowPage>>,
    live: usize,
    bucket_limit: Option<usize>,
}

fn home(id: PageId, buckets: usize) -> usize {
    (id.0 % buckets as u64) as usize
}

fn alloc_buckets<T>(buckets: usize) -> Result<Vec<Option<T>>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(buckets)
        .map_err(|_| TxnError::OutOfMemory {
            bytes: buckets.saturating_mul(mem::size_of::<Option<T>>()),
        })?;
    slots.resize_with(buckets, || None);
    Ok(slots)
}

impl PageTable {
    /// Creates an empty table with `initial_buckets` buckets.
    pub fn new(initial_buckets: usize) -> Result<Self> {
        if initial_buckets == 0 {
            return Err(TxnError::Invalid("page table needs at least one bucket"));
        }
        Ok(Self {
            slots: alloc_buckets(initial_buckets)?,
            live: 0,
            bucket_limit: None,
        })
    }

    /// Refuses to grow past `limit` buckets.
    pub fn with_bucket_limit(mut self, limit: Option<usize>) -> Self {
        self.bucket_limit = limit;
        self
    }

    /// Number of tracked pages.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no page is tracked.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.slots.len()
    }

    /// Load threshold (three quarters of the buckets) that triggers growth.
    pub fn max_pages(&self) -> usize {
        self.slots.len() * 3 / 4
    }

    /// Slot index holding `id`, if tracked.
    pub fn find(&self, id: PageId) -> Option<usize> {
        let buckets = self.slots.len();
        let start = home(id, buckets);
        for i in 0..buckets {
            let idx = (start + i) % buckets;
            match &self.slots[idx] {
                None => return None,
                Some(page) if page.id == id => return Some(idx),
                Some(_) => {}
            }
        }
        None
    }

    /// The tracked copy of `id`.
    pub fn lookup(&self, id: PageId) -> Option<&CowPage> {
        let idx = self.find(id)?;
        self.slots[idx].as_ref()
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> Option<&mut CowPage> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Tracked pages in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &CowPage> + '_ {
        self.slots.iter().flatten()
    }

    /// Registers a page that is not tracked yet.
    ///
    /// Crossing the load threshold doubles the table. If that growth is
    /// refused for lack of memory the page stays registered at the higher
    /// load and growth is attempted again on a later insert. On any error the
    /// page comes back inside [`Rejected`].
    pub fn insert(&mut self, page: CowPage) -> std::result::Result<(), Rejected> {
        let id = page.id;
        let mut page = page;
        // A growth at least doubles the free slots, so a pass that follows a
        // successful growth always places the page.
        loop {
            match self.place(page) {
                Placement::Placed(idx) => return self.settle(idx),
                Placement::Duplicate(page) => {
                    return Err(Rejected {
                        error: TxnError::AlreadyExists(id),
                        page,
                    })
                }
                Placement::Full(rejected) => match self.grow() {
                    Growth::Grown => page = rejected,
                    Growth::Refused { bytes } => {
                        return Err(Rejected {
                            error: TxnError::OutOfMemory { bytes },
                            page: rejected,
                        })
                    }
                    Growth::Failed(stuck) => {
                        return Err(Rejected {
                            error: TxnError::ResizeFailure(stuck),
                            page: rejected,
                        })
                    }
                },
            }
        }
    }

    fn place(&mut self, page: CowPage) -> Placement {
        let buckets = self.slots.len();
        let start = home(page.id, buckets);
        for i in 0..buckets {
            let idx = (start + i) % buckets;
            if let Some(existing) = &self.slots[idx] {
                if existing.id == page.id {
                    return Placement::Duplicate(page);
                }
                continue;
            }
            trace!(page = page.id.0, slot = idx, "txn.table.place");
            self.slots[idx] = Some(page);
            self.live += 1;
            return Placement::Placed(idx);
        }
        Placement::Full(page)
    }

    fn settle(&mut self, idx: usize) -> std::result::Result<(), Rejected> {
        if self.live + 1 < self.max_pages() {
            return Ok(());
        }
        match self.grow() {
            Growth::Grown => Ok(()),
            Growth::Refused { bytes } => {
                warn!(
                    live = self.live,
                    buckets = self.slots.len(),
                    bytes,
                    "txn.table.grow_refused"
                );
                Ok(())
            }
            Growth::Failed(stuck) => {
                // The page was the latest placement, so no probe chain runs
                // through its slot and it can be taken back out.
                let Some(page) = self.slots[idx].take() else {
                    return Ok(());
                };
                self.live -= 1;
                Err(Rejected {
                    error: TxnError::ResizeFailure(stuck),
                    page,
                })
            }
        }
    }

    fn grow(&mut self) -> Growth {
        let old = self.slots.len();
        let Some(target) = old.checked_mul(2) else {
            return Growth::Refused { bytes: usize::MAX };
        };
        let bytes = target.saturating_mul(mem::size_of::<Option<CowPage>>());
        if self.bucket_limit.is_some_and(|limit| target > limit) {
            return Growth::Refused { bytes };
        }
        match self.rehash(target) {
            Ok(()) => {
                debug!(from = old, to = target, live = self.live, "txn.table.grow");
                Growth::Grown
            }
            Err(TxnError::ResizeFailure(stuck)) => Growth::Failed(stuck),
            Err(_) => Growth::Refused { bytes },
        }
    }

    /// Moves every entry into a fresh table of `buckets` buckets.
    ///
    /// Placement is planned before anything moves, so on failure the current
    /// table is left exactly as it was.
    fn rehash(&mut self, buckets: usize) -> Result<()> {
        let mut plan: Vec<Option<usize>> = alloc_buckets(buckets)?;
        for (origin, slot) in self.slots.iter().enumerate() {
            let Some(page) = slot else { continue };
            let start = home(page.id, buckets);
            let target = (0..buckets)
                .map(|i| (start + i) % buckets)
                .find(|&idx| plan[idx].is_none());
            match target {
                Some(idx) => plan[idx] = Some(origin),
                None => {
                    warn!(page = page.id.0, buckets, "txn.table.rehash_no_slot");
                    return Err(TxnError::ResizeFailure(page.id));
                }
            }
        }
        let mut slots = alloc_buckets(buckets)?;
        for (idx, origin) in plan.into_iter().enumerate() {
            if let Some(origin) = origin {
                slots[idx] = self.slots[origin].take();
            }
        }
        self.slots = slots;
        Ok(())
    }

    /// Hands every tracked page to `sink` in bucket order, releasing each
    /// buffer to `alloc` once the sink accepted it.
    ///
    /// Stops at the first sink error. Pages already drained are gone; the
    /// failing page and everything after it stay tracked, so draining again
    /// resumes where this call stopped.
    pub fn drain<F>(&mut self, alloc: &dyn PageAllocator, mut sink: F) -> Result<usize>
    where
        F: FnMut(&CowPage) -> Result<()>,
    {
        let mut drained = 0;
        for slot in self.slots.iter_mut() {
            let Some(page) = slot.as_ref() else { continue };
            sink(page)?;
            if let Some(page) = slot.take() {
                alloc.release(page.into_buffer());
                self.live -= 1;
                drained += 1;
            }
        }
        Ok(drained)
    }
}
