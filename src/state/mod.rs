//! State management module.
//!
//! This module provides persistent state storage for tracking managed
//! entities: the remote id assigned to each declared entity, the hash of the
//! payload last sent, and a short apply history.

mod local;
mod lock;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::StateStore;
pub use types::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, EntityKind, EntityRecord,
    STATE_VERSION, record_key,
};
