//! Stack locking for local concurrent access protection.
//!
//! A lock is a small JSON file created exclusively next to the state file.
//! Locks expire after [`LOCK_EXPIRY_SECS`] so a crashed invocation does not
//! block the stack forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LbStackError, Result, StateError};

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a stack lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// Command that took the lock.
    pub operation: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(holder: &str, operation: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            operation: operation.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

/// A lock file on disk.
#[derive(Debug)]
pub struct StateLock<'a> {
    path: &'a Path,
}

impl<'a> StateLock<'a> {
    /// Wraps the lock file at `path`.
    #[must_use]
    pub const fn at(path: &'a Path) -> Self {
        Self { path }
    }

    /// Reads the current lock, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file exists but is unreadable.
    pub async fn read(&self) -> Result<Option<LockInfo>> {
        let content = match fs::read_to_string(self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LbStackError::State(StateError::Corrupted {
                    message: format!("Failed to read lock file: {e}"),
                }));
            }
        };

        let info = serde_json::from_str(&content).map_err(|e| {
            LbStackError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;
        Ok(Some(info))
    }

    /// Takes the lock, replacing an expired one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockedByOther`] if a live lock exists, or an
    /// error if the lock file cannot be written.
    pub async fn acquire(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read().await? {
            if !existing.is_expired() {
                return Err(LbStackError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock {} found, taking over", existing.lock_id);
            self.remove().await?;
        }

        let info = LockInfo::new(holder, operation);
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    LbStackError::State(StateError::LockFailed {
                        message: String::from("Another process took the lock concurrently"),
                    })
                } else {
                    LbStackError::State(StateError::LockFailed {
                        message: format!("Failed to create lock file: {e}"),
                    })
                }
            })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            LbStackError::State(StateError::LockFailed {
                message: format!("Failed to write lock file: {e}"),
            })
        })?;
        file.sync_all().await.map_err(|e| {
            LbStackError::State(StateError::LockFailed {
                message: format!("Failed to sync lock file: {e}"),
            })
        })?;

        Ok(info)
    }

    /// Releases the lock if `lock_id` still owns it.
    ///
    /// Returns true if the lock file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or removed.
    pub async fn release(&self, lock_id: &str) -> Result<bool> {
        match self.read().await? {
            Some(existing) if existing.lock_id == lock_id => {
                self.remove().await?;
                Ok(true)
            }
            Some(existing) => {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Removes the lock file regardless of owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub async fn remove(&self) -> Result<()> {
        match fs::remove_file(self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LbStackError::State(StateError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })),
        }
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}
