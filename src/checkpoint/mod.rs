//! Checkpoint persistence: portable snapshot records, pluggable stores,
//! and the two-tier manager that decides where snapshots live.

pub mod manager;
pub mod sqlite;
pub mod store;

pub use manager::{BackendSelection, CheckpointManager, DEFAULT_PROVISION_TIMEOUT};
pub use sqlite::SqliteStore;
pub use store::{
    Checkpoint, CheckpointMetadata, CheckpointStore, MemoryProvisioner, MemoryStore,
    StoreProvisioner,
};
