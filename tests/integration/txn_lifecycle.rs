#![allow(missing_docs)]

use std::io;
use std::sync::Arc;

use cowtxn::primitives::alloc::CountingAllocator;
use cowtxn::primitives::store::{MemStore, PageImage, PageStore};
use cowtxn::txn::{format_metadata_page, Transaction, TxnFlags, TxnState};
use cowtxn::types::{page::PAGE_SIZE, PageId, Result, TxnError};
use cowtxn::TxnOptions;

fn seeded_store(pages: u64) -> Arc<MemStore> {
    let store = Arc::new(MemStore::new());
    let mut meta = vec![0u8; PAGE_SIZE];
    format_metadata_page(&mut meta).unwrap();
    store.insert(PageId(0), meta);
    for id in 1..=pages {
        store.insert(PageId(id), vec![id as u8; PAGE_SIZE]);
    }
    store
}

fn counted_txn(store: Arc<dyn PageStore>) -> (Transaction, Arc<CountingAllocator>) {
    let alloc = Arc::new(CountingAllocator::new());
    let tx = Transaction::with_options(
        store,
        alloc.clone(),
        TxnFlags::READ_WRITE,
        TxnOptions::default(),
    )
    .unwrap();
    (tx, alloc)
}

/// Store whose writes to one page always fail.
struct FailingStore {
    inner: Arc<MemStore>,
    fail_on: PageId,
}

impl PageStore for FailingStore {
    fn get(&self, id: PageId) -> Result<PageImage> {
        self.inner.get(id)
    }

    fn put(&self, id: PageId, data: &[u8]) -> Result<()> {
        if id == self.fail_on {
            return Err(TxnError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.inner.put(id, data)
    }
}

#[test]
fn commit_publishes_copies_and_empties_table() {
    let store = seeded_store(3);
    let (mut tx, alloc) = counted_txn(store.clone());

    tx.modify_page(PageId(1)).unwrap().data_mut()[0] = 0xAA;
    tx.modify_page(PageId(3)).unwrap().data_mut()[10] = 0xBB;
    assert_eq!(tx.tracked_pages(), 2);

    tx.commit().unwrap();
    assert_eq!(tx.state(), TxnState::Committed);
    assert_eq!(tx.tracked_pages(), 0);
    assert_eq!(alloc.stats().outstanding(), 0);

    assert_eq!(store.get(PageId(1)).unwrap().data()[0], 0xAA);
    assert_eq!(store.get(PageId(3)).unwrap().data()[10], 0xBB);
    assert_eq!(store.get(PageId(2)).unwrap().data()[0], 2);

    // Reads after commit go straight to the store.
    let page = tx.get(PageId(1)).unwrap();
    assert!(!page.is_private());
    assert_eq!(page.data()[0], 0xAA);
}

#[test]
fn close_discards_uncommitted_copies() {
    let store = seeded_store(2);
    let (mut tx, alloc) = counted_txn(store.clone());

    tx.modify_page(PageId(2)).unwrap().data_mut().fill(0xFF);
    tx.close().unwrap();

    assert_eq!(tx.state(), TxnState::Closed);
    assert_eq!(store.len(), 3);
    assert_eq!(alloc.stats().outstanding(), 0);
    assert!(store.get(PageId(2)).unwrap().data().iter().all(|&b| b == 2));
}

#[test]
fn close_twice_is_a_no_op() {
    let (mut tx, alloc) = counted_txn(seeded_store(1));
    tx.modify_page(PageId(1)).unwrap();
    tx.close().unwrap();
    tx.close().unwrap();
    assert_eq!(alloc.stats().releases, 1);
}

#[test]
fn closed_transaction_rejects_page_access() {
    let (mut tx, _alloc) = counted_txn(seeded_store(1));
    tx.close().unwrap();
    assert!(matches!(tx.get(PageId(1)), Err(TxnError::Invalid(_))));
    assert!(matches!(tx.modify_page(PageId(1)), Err(TxnError::Invalid(_))));
}

#[test]
fn committed_transaction_rejects_modify() {
    let (mut tx, _alloc) = counted_txn(seeded_store(1));
    tx.commit().unwrap();
    assert!(matches!(
        tx.modify_page(PageId(1)),
        Err(TxnError::Invalid("transaction already committed"))
    ));
    assert_eq!(tx.tracked_pages(), 0);
}

#[test]
fn failed_commit_keeps_unwritten_pages_until_close() {
    let inner = seeded_store(3);
    let store = Arc::new(FailingStore {
        inner: inner.clone(),
        fail_on: PageId(2),
    });
    let (mut tx, alloc) = counted_txn(store);
    for id in 1..=3 {
        tx.modify_page(PageId(id)).unwrap().data_mut()[0] = 0xC0 | id as u8;
    }

    let err = tx.commit().unwrap_err();
    assert!(matches!(err, TxnError::Io(_)));
    assert_eq!(tx.state(), TxnState::Active);

    // Pages before the failing one in table order were published and released.
    assert_eq!(inner.get(PageId(1)).unwrap().data()[0], 0xC1);
    assert_eq!(inner.get(PageId(2)).unwrap().data()[0], 2);
    assert_eq!(inner.get(PageId(3)).unwrap().data()[0], 3);
    assert_eq!(tx.tracked_pages(), 2);
    assert_eq!(alloc.stats().outstanding(), 2);

    tx.close().unwrap();
    assert_eq!(alloc.stats().outstanding(), 0);
    assert_eq!(inner.get(PageId(3)).unwrap().data()[0], 3);
}

#[test]
fn dropping_an_active_transaction_releases_everything() {
    let store = seeded_store(4);
    let alloc = Arc::new(CountingAllocator::new());
    {
        let mut tx = Transaction::with_options(
            store.clone(),
            alloc.clone(),
            TxnFlags::READ_WRITE,
            TxnOptions::default(),
        )
        .unwrap();
        for id in 1..=4 {
            tx.modify_page(PageId(id)).unwrap().data_mut()[1] = 0xEE;
        }
        assert_eq!(alloc.stats().outstanding(), 4);
    }
    assert_eq!(alloc.stats().outstanding(), 0);
    assert_eq!(store.get(PageId(4)).unwrap().data()[1], 4);
}
