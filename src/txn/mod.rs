//! Transaction working set.
//!
//! A [`Transaction`] tracks the pages it modified in a [`PageTable`], hands
//! out copy-on-write buffers through [`Transaction::modify`], sizes those
//! buffers from per-page metadata records, and writes or discards the whole
//! set when it commits or closes.

mod cow;
mod metadata;
mod table;
mod transaction;

pub use cow::{PageMut, PageRef};
pub use metadata::{
    format_metadata_page, index_in_group, is_metadata_page, metadata_page_of, set_record,
    MetadataMut, MetadataRef,
};
pub use table::{CowPage, PageTable, Rejected};
pub use transaction::{Transaction, TxnFlags, TxnState};
