// ABOUTME: Version policy (next-version rules) and persisted version records.
// ABOUTME: Re-exports the policy function and the store trait with its file backend.

mod policy;
mod store;

pub use policy::{ROLLOVER_THRESHOLD, next_version};
pub use store::{
    BACKUP_SUFFIX, FileVersionStore, StoreError, VERSION_KEY, VersionRecord, VersionStore,
};
pub(crate) use store::write_atomic;
