//! Offline-first synchronization engine for waste-tracking kiosk stations.
//!
//! A station keeps working through connectivity loss: feed records, images
//! and catalog changes land on the local store first and background jobs
//! reconcile them with the central replica whenever it is reachable. The
//! crate is transport- and storage-agnostic; adapters implement the traits
//! in [`store`] and the binary wires them together.

pub mod errors;
pub mod models;
pub mod store;
pub mod sync;

/// In-memory adapters used by this crate's tests and by downstream test
/// suites. Not part of the stable API surface.
#[doc(hidden)]
pub mod testing;

pub use errors::{Error, Result, RetryClass};
pub use store::{ConnectivityProbe, DocumentStore, Filter, ObjectStore, StoreMode, WriteOutcome};
pub use sync::{SyncConfig, SyncEngine};
