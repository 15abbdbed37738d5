//! Collaborators the transaction core is built on.
//!
//! Includes positioned file I/O, page-buffer allocation, and the durable page
//! store contract together with its reference implementations.

/// Page-buffer allocation.
///
/// The allocator contract plus a heap-backed and a counting implementation.
pub mod alloc;

/// I/O abstractions and utilities.
///
/// Interfaces for positioned reads and writes against a file.
pub mod io;

/// Durable page store.
///
/// Fetches pristine pages by number and persists committed pages.
pub mod store;
