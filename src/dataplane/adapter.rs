//! Adapter traits over the remote configuration API.
//!
//! The orchestrator and the transaction coordinator only talk to these
//! traits; [`super::DataplaneClient`] implements them over HTTP.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind};

use super::types::TransactionHandle;

/// Remote transaction lifecycle.
#[async_trait]
pub trait TransactionApi: Send + Sync {
    /// Opens a transaction against the current configuration version.
    async fn begin(&self) -> Result<TransactionHandle>;

    /// Commits a transaction.
    async fn commit(&self, txn: &TransactionHandle) -> Result<()>;

    /// Discards a transaction.
    async fn rollback(&self, txn: &TransactionHandle) -> Result<()>;
}

/// Access to parent sections (backends and frontends).
#[async_trait]
pub trait ParentAdapter: Send + Sync {
    /// Fetches a parent, or `None` if it does not exist.
    async fn get_parent(&self, parent_type: ParentType, name: &str)
    -> Result<Option<ParentResource>>;

    /// Creates a parent.
    async fn create_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()>;

    /// Replaces a parent's settings.
    async fn update_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()>;

    /// Deletes a parent.
    async fn delete_parent(
        &self,
        parent_type: ParentType,
        name: &str,
        txn: &TransactionHandle,
    ) -> Result<()>;
}

/// Access to one ordered sub-collection of a parent.
///
/// Mutations are always staged in a transaction. `index` is the position the
/// operation targets; kinds addressed by name use `name` / `current_name`
/// instead.
#[async_trait]
pub trait CollectionAdapter: Send + Sync {
    /// Lists the committed entries of a collection in remote order.
    async fn list(&self, kind: SubResourceKind, scope: &ParentScope)
    -> Result<Vec<SubResourceEntry>>;

    /// Inserts an entry at `index`.
    async fn create(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
        index: i64,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()>;

    /// Overwrites the entry at `index` (currently named `current_name`).
    async fn update_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        current_name: Option<&str>,
        scope: &ParentScope,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()>;

    /// Removes the entry at `index` (named `name`).
    async fn delete_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        name: Option<&str>,
        scope: &ParentScope,
        txn: &TransactionHandle,
    ) -> Result<()>;
}

/// Everything a stack lifecycle call needs from the remote side.
pub trait DataplaneApi: TransactionApi + ParentAdapter + CollectionAdapter {}

impl<T: TransactionApi + ParentAdapter + CollectionAdapter> DataplaneApi for T {}
