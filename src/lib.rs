//! Per-transaction page working set for a page-oriented storage engine.
//!
//! A transaction remembers every page it modified, gives each one a private
//! copy-on-write buffer sized from the page's metadata record, and at the end
//! either writes the buffers back to the page store or throws them away.

pub mod options;
pub mod primitives;
pub mod txn;
pub mod types;

pub use options::TxnOptions;
pub use txn::{PageMut, PageRef, Transaction, TxnFlags, TxnState};
pub use types::{PageId, Result, TxnError};
