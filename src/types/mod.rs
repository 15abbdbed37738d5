#![forbid(unsafe_code)]

//! Identifiers, errors and page constants shared by every layer of the crate.

use std::fmt;

/// Page number; the key of the transaction page table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors reported by the transaction working set and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum TxnError {
    /// Failure reported by the underlying file or device.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The store holds no such page.
    #[error("page {0} not found")]
    NotFound(PageId),
    /// The page is already tracked by the transaction.
    #[error("page {0} already exists in the transaction table")]
    AlreadyExists(PageId),
    /// A page buffer or the table itself could not be allocated.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory {
        /// Size of the refused allocation.
        bytes: usize,
    },
    /// A group-leading page does not carry the metadata tag.
    #[error("page {page} is not a metadata page (tag {found:#x})")]
    TypeMismatch {
        /// The page that was expected to hold metadata.
        page: PageId,
        /// Tag byte found in its first record.
        found: u8,
    },
    /// Rehashing during growth could not place an existing entry.
    #[error("failed to place page {0} after table resize")]
    ResizeFailure(PageId),
    /// Malformed on-page data.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Misuse of the API.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Malformed TOML configuration.
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TxnError>;

pub mod page {
    //! Page geometry and the per-page tags stored in metadata records.

    use core::convert::TryFrom;

    use super::{Result, TxnError};

    /// Size of one storage unit in bytes.
    pub const PAGE_SIZE: usize = 8192;

    /// Number of pages described by a single metadata page.
    pub const PAGES_IN_METADATA: u64 = 128;

    /// Mask selecting the group-leading (metadata) page of a page number.
    pub const PAGES_IN_METADATA_MASK: u64 = !(PAGES_IN_METADATA - 1);

    /// Size of one metadata record in bytes.
    pub const METADATA_RECORD_LEN: usize = PAGE_SIZE / PAGES_IN_METADATA as usize;

    /// Tag describing what a page is used for.
    #[repr(u8)]
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub enum PageFlags {
        /// Unused page.
        Free = 0,
        /// Page holding a record that fits in one unit.
        Single = 1,
        /// First page of a multi-page record.
        OverflowFirst = 2,
        /// Continuation page of a multi-page record.
        OverflowRest = 3,
        /// Metadata page describing its group.
        Metadata = 4,
    }

    impl PageFlags {
        /// Returns the on-page byte for this tag.
        pub const fn as_u8(self) -> u8 {
            self as u8
        }
    }

    impl TryFrom<u8> for PageFlags {
        type Error = TxnError;

        fn try_from(value: u8) -> Result<Self> {
            match value {
                0 => Ok(PageFlags::Free),
                1 => Ok(PageFlags::Single),
                2 => Ok(PageFlags::OverflowFirst),
                3 => Ok(PageFlags::OverflowRest),
                4 => Ok(PageFlags::Metadata),
                _ => Err(TxnError::Corruption("unknown page flags")),
            }
        }
    }

    /// Number of `PAGE_SIZE` units a record of `overflow_size` bytes occupies.
    ///
    /// Zero means "unknown" and still occupies one unit.
    pub fn span_count(overflow_size: u32) -> u32 {
        let size = overflow_size as usize;
        let pages = size / PAGE_SIZE + usize::from(size % PAGE_SIZE != 0);
        pages.max(1) as u32
    }

    /// Byte length of `pages` storage units.
    pub fn span_bytes(pages: u32) -> usize {
        pages as usize * PAGE_SIZE
    }
}
