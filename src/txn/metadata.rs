//! Per-page metadata records.
//!
//! Page numbers are split into groups of
//! [`PAGES_IN_METADATA`](crate::types::page::PAGES_IN_METADATA) pages. The
//! first page of every group is a metadata page: an array of fixed-size
//! records, one per page of the group, with record 0 describing the metadata
//! page itself. A page's record carries its tag and the byte length of the
//! record it heads, which is what sizes copy-on-write buffers.
//!
//! Metadata pages are read and modified through the same transaction paths
//! as every other page, so metadata written by a transaction stays private to
//! it until commit.
//!
//! A metadata page is always exactly one unit long. Size resolution never
//! looks up a metadata page's own record, which would otherwise send the
//! lookup back into the page being resolved.

use core::convert::TryFrom;
use std::ops::Range;

use super::cow::PageRef;
use super::transaction::Transaction;
use crate::types::{
    page::{PageFlags, METADATA_RECORD_LEN, PAGES_IN_METADATA_MASK, PAGE_SIZE},
    PageId, Result, TxnError,
};

const RECORD_FLAGS: usize = 0;
const RECORD_RESERVED: Range<usize> = 1..4;
const RECORD_OVERFLOW_SIZE: Range<usize> = 4..8;

/// Metadata page of the group `id` belongs to.
pub fn metadata_page_of(id: PageId) -> PageId {
    PageId(id.0 & PAGES_IN_METADATA_MASK)
}

/// Position of `id`'s record inside its metadata page.
pub fn index_in_group(id: PageId) -> usize {
    (id.0 & !PAGES_IN_METADATA_MASK) as usize
}

/// Returns true if `id` leads its group and therefore holds metadata.
pub fn is_metadata_page(id: PageId) -> bool {
    id.0 & PAGES_IN_METADATA_MASK == id.0
}

fn record_range(id: PageId) -> Range<usize> {
    let start = index_in_group(id) * METADATA_RECORD_LEN;
    start..start + METADATA_RECORD_LEN
}

fn read_overflow_size(record: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&record[RECORD_OVERFLOW_SIZE]);
    u32::from_be_bytes(raw)
}

fn check_metadata_page(page: PageId, data: &[u8]) -> Result<()> {
    if data.len() < PAGE_SIZE {
        return Err(TxnError::Corruption("metadata page truncated"));
    }
    let found = data[RECORD_FLAGS];
    if found != PageFlags::Metadata.as_u8() {
        return Err(TxnError::TypeMismatch { page, found });
    }
    Ok(())
}

/// Initialises `buf` as an empty metadata page.
///
/// Every record is cleared and record 0 is tagged as metadata with a one-unit
/// size.
pub fn format_metadata_page(buf: &mut [u8]) -> Result<()> {
    if buf.len() < PAGE_SIZE {
        return Err(TxnError::Invalid("metadata buffer too small"));
    }
    buf[..PAGE_SIZE].fill(0);
    buf[RECORD_FLAGS] = PageFlags::Metadata.as_u8();
    buf[RECORD_OVERFLOW_SIZE].copy_from_slice(&(PAGE_SIZE as u32).to_be_bytes());
    Ok(())
}

/// Writes `id`'s record into the metadata page image `buf`.
pub fn set_record(buf: &mut [u8], id: PageId, flags: PageFlags, overflow_size: u32) -> Result<()> {
    if buf.len() < PAGE_SIZE {
        return Err(TxnError::Invalid("metadata buffer too small"));
    }
    let mut record = MetadataMut {
        id,
        record: &mut buf[record_range(id)],
    };
    record.set_flags(flags);
    record.set_overflow_size(overflow_size);
    Ok(())
}

/// Read view of a page's metadata record.
///
/// Aliases the metadata page's buffer, whether that is the store's image or
/// this transaction's private copy.
pub struct MetadataRef<'t> {
    id: PageId,
    page: PageRef<'t>,
}

impl<'t> MetadataRef<'t> {
    fn record(&self) -> &[u8] {
        &self.page.data()[record_range(self.id)]
    }

    /// Page this record describes.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Metadata page holding the record.
    pub fn metadata_page(&self) -> PageId {
        self.page.id
    }

    /// Raw tag byte.
    pub fn raw_flags(&self) -> u8 {
        self.record()[RECORD_FLAGS]
    }

    /// Decoded tag.
    pub fn flags(&self) -> Result<PageFlags> {
        PageFlags::try_from(self.raw_flags())
    }

    /// Byte length of the record headed by the page, 0 if unknown.
    pub fn overflow_size(&self) -> u32 {
        read_overflow_size(self.record())
    }

    /// Returns true if the bytes come from this transaction's private copy.
    pub fn is_private(&self) -> bool {
        self.page.is_private()
    }
}

/// Write view of a page's metadata record inside a private metadata page.
pub struct MetadataMut<'t> {
    id: PageId,
    record: &'t mut [u8],
}

impl<'t> MetadataMut<'t> {
    /// Page this record describes.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Raw tag byte.
    pub fn raw_flags(&self) -> u8 {
        self.record[RECORD_FLAGS]
    }

    /// Decoded tag.
    pub fn flags(&self) -> Result<PageFlags> {
        PageFlags::try_from(self.raw_flags())
    }

    /// Byte length of the record headed by the page, 0 if unknown.
    pub fn overflow_size(&self) -> u32 {
        read_overflow_size(self.record)
    }

    /// Replaces the tag.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.record[RECORD_FLAGS] = flags.as_u8();
        self.record[RECORD_RESERVED].fill(0);
    }

    /// Replaces the record length.
    pub fn set_overflow_size(&mut self, overflow_size: u32) {
        self.record[RECORD_OVERFLOW_SIZE].copy_from_slice(&overflow_size.to_be_bytes());
    }
}

impl Transaction {
    /// Reads the metadata record describing `id`.
    ///
    /// Fails with [`TxnError::TypeMismatch`] if the group's leading page is not
    /// tagged as metadata. Never changes the working set.
    pub fn get_metadata_record(&self, id: PageId) -> Result<MetadataRef<'_>> {
        let meta_id = metadata_page_of(id);
        let page = self.get(meta_id)?;
        check_metadata_page(meta_id, page.data())?;
        Ok(MetadataRef { id, page })
    }

    /// Returns `id`'s metadata record inside a private copy of its metadata
    /// page, so writes through it stay in this transaction until commit.
    pub fn modify_metadata_record(&mut self, id: PageId) -> Result<MetadataMut<'_>> {
        let meta_id = metadata_page_of(id);
        {
            // Verify before copying so a wrong page never enters the table.
            let page = self.get(meta_id)?;
            check_metadata_page(meta_id, page.data())?;
        }
        let data = self.modify(meta_id, 0)?.into_data();
        Ok(MetadataMut {
            id,
            record: &mut data[record_range(id)],
        })
    }

    /// Byte length of the record `id` heads, as its metadata says.
    pub(super) fn resolve_overflow_size(&self, id: PageId) -> Result<u32> {
        if is_metadata_page(id) {
            return Ok(PAGE_SIZE as u32);
        }
        Ok(self.get_metadata_record(id)?.overflow_size())
    }
}
