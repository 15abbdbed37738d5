#![allow(missing_docs)]

use std::sync::Arc;

use cowtxn::primitives::store::{FileStore, PageStore};
use cowtxn::txn::{format_metadata_page, set_record, Transaction, TxnFlags};
use cowtxn::types::{
    page::{PageFlags, PAGE_SIZE},
    PageId, TxnError,
};
use tempfile::tempdir;

const RECORD_LEN: u32 = 3 * PAGE_SIZE as u32 - 17;

fn build_file(store: &FileStore) {
    let mut meta = vec![0u8; PAGE_SIZE];
    format_metadata_page(&mut meta).unwrap();
    set_record(&mut meta, PageId(1), PageFlags::Single, PAGE_SIZE as u32).unwrap();
    set_record(&mut meta, PageId(2), PageFlags::OverflowFirst, RECORD_LEN).unwrap();
    set_record(&mut meta, PageId(3), PageFlags::OverflowRest, 0).unwrap();
    set_record(&mut meta, PageId(4), PageFlags::OverflowRest, 0).unwrap();
    store.put(PageId(0), &meta).unwrap();
    store.put(PageId(1), &vec![1u8; PAGE_SIZE]).unwrap();
    for (offset, id) in (2..=4u64).enumerate() {
        let fill = vec![0x20 + offset as u8; PAGE_SIZE];
        store.put(PageId(id), &fill).unwrap();
    }
    store.put(PageId(5), &vec![5u8; PAGE_SIZE]).unwrap();
    store.sync().unwrap();
}

#[test]
fn overflow_record_round_trips_through_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pages.db");
    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        build_file(&store);

        let mut tx = Transaction::begin(store.clone(), TxnFlags::READ_WRITE).unwrap();
        let mut page = tx.modify_page(PageId(2)).unwrap();
        assert_eq!(page.overflow_size, RECORD_LEN);
        assert_eq!(page.data().len(), 3 * PAGE_SIZE);
        assert_eq!(page.data()[0], 0x20);
        assert_eq!(page.data()[PAGE_SIZE], 0x21);
        assert_eq!(page.data()[3 * PAGE_SIZE - 1], 0x22);
        page.data_mut()[2 * PAGE_SIZE + 7] = 0x99;
        assert_eq!(tx.tracked_pages(), 1);

        tx.commit().unwrap();
        store.sync().unwrap();
        tx.close().unwrap();
    }

    let store = Arc::new(FileStore::open(&path).unwrap());
    assert_eq!(store.page_count().unwrap(), 6);
    let tail = store.get(PageId(4)).unwrap();
    assert_eq!(tail.data()[7], 0x99);
    assert_eq!(tail.data()[8], 0x22);
    assert_eq!(store.get(PageId(5)).unwrap().data()[0], 5);
}

#[test]
fn uncommitted_changes_never_touch_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pages.db");
    let store = Arc::new(FileStore::open(&path).unwrap());
    build_file(&store);

    let mut tx = Transaction::begin(store.clone(), TxnFlags::READ_WRITE).unwrap();
    tx.modify_page(PageId(1)).unwrap().data_mut().fill(0);
    {
        let mut record = tx.modify_metadata_record(PageId(1)).unwrap();
        record.set_flags(PageFlags::Free);
    }
    tx.close().unwrap();

    let reader = Transaction::begin(store, TxnFlags::READ).unwrap();
    assert_eq!(reader.get(PageId(1)).unwrap().data()[0], 1);
    let record = reader.get_metadata_record(PageId(1)).unwrap();
    assert_eq!(record.flags().unwrap(), PageFlags::Single);
}

#[test]
fn pages_past_end_of_file_are_not_found() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("pages.db")).unwrap());
    build_file(&store);

    let mut tx = Transaction::begin(store, TxnFlags::READ_WRITE).unwrap();
    assert!(matches!(tx.get(PageId(6)), Err(TxnError::NotFound(PageId(6)))));
    assert!(matches!(
        tx.modify_page(PageId(90)),
        Err(TxnError::NotFound(PageId(90)))
    ));
    assert_eq!(tx.tracked_pages(), 0);
}
