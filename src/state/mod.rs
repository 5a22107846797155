//! Caller-side state for lbstack.
//!
//! This module records what the last lifecycle call applied: parents, the
//! order of every sub-collection, the stack file hash and a short history.
//! It also provides the lock that serialises local invocations.

mod local;
mod lock;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, StateLock, generate_holder_id};
pub use store::StateStore;
pub use types::{
    CollectionState, HistoryEntry, LifecycleOperation, MAX_HISTORY, STATE_VERSION, StackState,
};
