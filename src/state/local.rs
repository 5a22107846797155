//! Local file-based state storage backend.
//!
//! Each stack gets `<stack>.state.json` and `<stack>.lock` in the state
//! directory (`.lbstack/` by default). State writes go through a temporary
//! file and a rename so a crash never leaves a truncated state behind.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{LbStackError, Result, StateError};

use super::lock::{LockInfo, StateLock, generate_holder_id};
use super::store::StateStore;
use super::types::{STATE_VERSION, StackState};

/// Default state directory name.
pub const STATE_DIR: &str = ".lbstack";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding state and lock files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
    /// Holder recorded in locks taken by this store.
    holder: String,
}

impl LocalStateStore {
    /// Creates a store for `stack` under `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>, stack: &str) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(format!("{stack}.state.json"));
        let lock_path = base_dir.join(format!("{stack}.lock"));

        Self {
            base_dir,
            state_path,
            lock_path,
            holder: generate_holder_id(),
        }
    }

    /// Sets the holder recorded in locks.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Path to the state file.
    #[must_use]
    pub const fn state_path(&self) -> &PathBuf {
        &self.state_path
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StateError::write(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<StackState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            LbStackError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: StackState = serde_json::from_str(&content).map_err(|e| {
            LbStackError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;

        if state.version != STATE_VERSION {
            return Err(LbStackError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }));
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &StackState) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp state file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write state file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename state file: {e}")))?;

        debug!("State saved successfully");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("Failed to delete state file: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, operation: &str) -> Result<LockInfo> {
        self.ensure_dir().await?;
        let info = StateLock::at(&self.lock_path)
            .acquire(&self.holder, operation)
            .await?;
        info!("Acquired state lock: {} for {operation}", info.lock_id);
        Ok(info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if StateLock::at(&self.lock_path).release(lock_id).await? {
            info!("Released state lock: {lock_id}");
        }
        Ok(())
    }

    async fn lock_info(&self) -> Result<Option<LockInfo>> {
        StateLock::at(&self.lock_path).read().await
    }

    async fn force_unlock(&self) -> Result<()> {
        info!("Force-removing lock file: {}", self.lock_path.display());
        StateLock::at(&self.lock_path).remove().await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
