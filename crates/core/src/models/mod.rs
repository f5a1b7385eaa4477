//! Domain models stored as documents on the local and remote stores.

mod catalog;
mod feed;
mod queue;

pub use catalog::{FeedType, Organization, Station, StationLabel, User, DEFAULT_ORG_ID};
pub use feed::{FeedRecord, ImageStatus, RawWeightSample, SyncStatus, RAW_WEIGHT_WINDOW};
pub use queue::{QueueEntry, QueueStatus, QueuedOperation};
