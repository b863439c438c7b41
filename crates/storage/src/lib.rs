//! remedy-storage: persistence contract for the remediation ledger.
//!
//! Defines the [`LedgerStorage`] trait, the [`ProcessedRecord`] row type,
//! two backends (in-memory and JSON file) and a conformance suite any
//! backend can run.

pub mod conformance;
mod error;
mod file;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use file::JsonFileLedgerStore;
pub use memory::MemoryLedgerStore;
pub use record::{ProcessedRecord, ProcessingStatus, TimeRange};
pub use traits::LedgerStorage;
