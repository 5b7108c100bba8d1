//! Sync orchestration
//!
//! Pulls each entity from a [`Fetcher`](crate::provider::Fetcher) and writes
//! it through the repositories, one page at a time. Work is strictly
//! sequential: a page is stored before the next one is requested.

mod deadline;
mod error;
mod report;
mod service;


pub use deadline::Deadline;
pub use error::{SyncError, SyncResult};
pub use report::{SyncEntity, SyncReport};
pub use service::{SyncOptions, SyncService, SyncStores};
