#![allow(missing_docs)]

use std::sync::Arc;

use cowtxn::primitives::alloc::CountingAllocator;
use cowtxn::primitives::store::{MemStore, PageStore};
use cowtxn::txn::{format_metadata_page, set_record, Transaction, TxnFlags};
use cowtxn::types::{
    page::{PageFlags, PAGE_SIZE},
    PageId, TxnError,
};
use cowtxn::TxnOptions;

fn seeded_store(pages: u64) -> Arc<MemStore> {
    let store = Arc::new(MemStore::new());
    let mut meta = vec![0u8; PAGE_SIZE];
    format_metadata_page(&mut meta).unwrap();
    for id in 1..=pages {
        set_record(&mut meta, PageId(id), PageFlags::Single, 512).unwrap();
        store.insert(PageId(id), vec![id as u8; PAGE_SIZE]);
    }
    store.insert(PageId(0), meta);
    store
}

fn txn_with(store: Arc<MemStore>, options: TxnOptions) -> (Transaction, Arc<CountingAllocator>) {
    let alloc = Arc::new(CountingAllocator::new());
    let tx =
        Transaction::with_options(store, alloc.clone(), TxnFlags::READ_WRITE, options).unwrap();
    (tx, alloc)
}

#[test]
fn repeated_modify_returns_same_copy() {
    let (mut tx, alloc) = txn_with(seeded_store(2), TxnOptions::default());

    let first = tx.modify_page(PageId(1)).unwrap().data().as_ptr();
    assert_eq!(tx.tracked_pages(), 1);
    let second = tx.modify_page(PageId(1)).unwrap().data().as_ptr();
    assert_eq!(first, second);
    assert_eq!(tx.tracked_pages(), 1);
    assert_eq!(alloc.stats().allocations, 1);
}

#[test]
fn writes_are_visible_only_inside_the_transaction() {
    let store = seeded_store(2);
    let (mut tx, _alloc) = txn_with(store.clone(), TxnOptions::default());
    let mut page = tx.modify_page(PageId(2)).unwrap();
    page.data_mut()[..4].copy_from_slice(b"cow!");

    let mine = tx.get(PageId(2)).unwrap();
    assert!(mine.is_private());
    assert_eq!(&mine.data()[..4], b"cow!");
    assert_eq!(mine.overflow_size, 512);

    let reader = Transaction::begin(store.clone(), TxnFlags::READ).unwrap();
    let theirs = reader.get(PageId(2)).unwrap();
    assert!(!theirs.is_private());
    assert_eq!(&theirs.data()[..4], &[2, 2, 2, 2]);
}

#[test]
fn committed_bytes_reach_a_new_transaction() {
    let store = seeded_store(3);
    let mut tx = Transaction::begin(store.clone(), TxnFlags::READ_WRITE).unwrap();
    tx.modify_page(PageId(3)).unwrap().data_mut()[PAGE_SIZE - 1] = 0x5A;
    tx.commit().unwrap();
    tx.close().unwrap();

    let next = Transaction::begin(store, TxnFlags::READ).unwrap();
    assert_eq!(next.get(PageId(3)).unwrap().data()[PAGE_SIZE - 1], 0x5A);
}

#[test]
fn missing_page_allocates_nothing() {
    let (mut tx, alloc) = txn_with(seeded_store(1), TxnOptions::default());
    let err = tx.modify_page(PageId(40)).err().unwrap();
    assert!(matches!(err, TxnError::NotFound(PageId(40))));
    assert_eq!(alloc.stats().allocations, 0);
    assert_eq!(tx.tracked_pages(), 0);
}

#[test]
fn unregistered_copy_is_released_when_table_cannot_grow() {
    let options = TxnOptions::default().max_table_buckets(8);
    let (mut tx, alloc) = txn_with(seeded_store(9), options);
    for id in 1..=8 {
        tx.modify_page(PageId(id)).unwrap();
    }
    assert_eq!(tx.bucket_count(), 8);
    assert_eq!(tx.tracked_pages(), 8);

    let err = tx.modify_page(PageId(9)).err().unwrap();
    assert!(matches!(err, TxnError::OutOfMemory { .. }));
    let stats = alloc.stats();
    assert_eq!(stats.allocations, 9);
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.outstanding(), 8);
    assert_eq!(tx.tracked_pages(), 8);

    tx.close().unwrap();
    assert_eq!(alloc.stats().outstanding(), 0);
}

#[test]
fn growth_keeps_every_copy_reachable() {
    let (mut tx, _alloc) = txn_with(seeded_store(40), TxnOptions::default());
    for id in 1..=40 {
        tx.modify_page(PageId(id)).unwrap().data_mut()[0] = 0x80 | id as u8;
    }
    assert_eq!(tx.tracked_pages(), 40);
    assert!(tx.bucket_count() >= 64);
    for id in 1..=40 {
        let page = tx.get(PageId(id)).unwrap();
        assert!(page.is_private());
        assert_eq!(page.data()[0], 0x80 | id as u8);
    }
}

#[test]
fn foreign_group_leader_is_rejected() {
    let store = seeded_store(1);
    store.insert(PageId(128), vec![PageFlags::OverflowRest.as_u8(); PAGE_SIZE]);
    store.insert(PageId(130), vec![0u8; PAGE_SIZE]);
    let (mut tx, alloc) = txn_with(store, TxnOptions::default());

    let err = tx.modify_page(PageId(130)).err().unwrap();
    assert!(matches!(
        err,
        TxnError::TypeMismatch {
            page: PageId(128),
            ..
        }
    ));
    assert_eq!(tx.tracked_pages(), 0);
    assert_eq!(alloc.stats().outstanding(), 0);
}

#[test]
fn metadata_pages_copy_a_single_unit() {
    let (mut tx, _alloc) = txn_with(seeded_store(1), TxnOptions::default());
    let meta = tx.modify_page(PageId(0)).unwrap();
    assert_eq!(meta.overflow_size, PAGE_SIZE as u32);
    assert_eq!(meta.data().len(), PAGE_SIZE);
    assert_eq!(meta.data()[0], PageFlags::Metadata.as_u8());
}

#[test]
fn record_edit_resizes_later_copies() {
    let store = seeded_store(1);
    store.insert(PageId(5), vec![5u8; 2 * PAGE_SIZE]);
    let (mut tx, _alloc) = txn_with(store.clone(), TxnOptions::default());
    {
        let mut record = tx.modify_metadata_record(PageId(5)).unwrap();
        record.set_flags(PageFlags::OverflowFirst);
        record.set_overflow_size(PAGE_SIZE as u32 + 1);
    }
    let page = tx.modify_page(PageId(5)).unwrap();
    assert_eq!(page.overflow_size, PAGE_SIZE as u32 + 1);
    assert_eq!(page.data().len(), 2 * PAGE_SIZE);
    assert!(page.data().iter().all(|&b| b == 5));
    assert_eq!(tx.tracked_pages(), 2);

    // Nothing reached the store yet.
    let reader = Transaction::begin(store.clone(), TxnFlags::READ).unwrap();
    let record = reader.get_metadata_record(PageId(5)).unwrap();
    assert_eq!(record.overflow_size(), 0);
    assert_eq!(store.get(PageId(0)).unwrap().data()[5 * 64], 0);
}
