//! In-memory Data Plane fake with transaction staging.
//!
//! Mutations are staged per transaction and only become visible to reads on
//! commit. Collections behave positionally: creates insert, deletes shift
//! later entries down, and reads report indices by position.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{DataplaneError, LbStackError, Result};
use crate::model::{ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind};

use super::adapter::{CollectionAdapter, ParentAdapter, TransactionApi};
use super::types::TransactionHandle;

type CollectionKey = (ParentScope, SubResourceKind);

#[derive(Debug, Clone, Default)]
struct Snapshot {
    parents: BTreeMap<(ParentType, String), ParentResource>,
    collections: HashMap<CollectionKey, Vec<SubResourceEntry>>,
}

impl Snapshot {
    fn require_parent(&self, scope: &ParentScope) -> Result<()> {
        if self
            .parents
            .contains_key(&(scope.parent_type, scope.parent_name.clone()))
        {
            Ok(())
        } else {
            Err(not_found(format!("{scope}")))
        }
    }

    fn locate(
        entries: &[SubResourceEntry],
        kind: SubResourceKind,
        index: i64,
        name: Option<&str>,
    ) -> Option<usize> {
        if kind.addressed_by_name() {
            entries.iter().position(|e| e.name.as_deref() == name)
        } else {
            usize::try_from(index).ok().filter(|pos| *pos < entries.len())
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    committed: Snapshot,
    staged: HashMap<String, Snapshot>,
    version: u64,
    next_id: u64,
    calls: Vec<String>,
    mutations: usize,
    fail_at: Option<usize>,
    commits: usize,
    rollbacks: usize,
}

/// An in-memory stand-in for the Data Plane API.
#[derive(Debug, Default)]
pub struct MemoryDataplane {
    inner: Mutex<Inner>,
}

fn not_found(resource: String) -> LbStackError {
    DataplaneError::NotFound { resource }.into()
}

impl MemoryDataplane {
    /// Creates an empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a committed parent.
    pub fn with_parent(self, parent: ParentResource) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .committed
                .parents
                .insert((parent.parent_type(), parent.name().to_string()), parent);
        }
        self
    }

    /// Seeds a committed collection, in the given order.
    pub fn with_entries(
        self,
        scope: &ParentScope,
        kind: SubResourceKind,
        entries: Vec<SubResourceEntry>,
    ) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .committed
                .collections
                .insert((scope.clone(), kind), entries);
        }
        self
    }

    /// Makes the `n`th mutation (1-based) fail with a 400.
    pub fn fail_on_mutation(self, n: usize) -> Self {
        self.inner.lock().unwrap().fail_at = Some(n);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of mutations attempted.
    pub fn mutations(&self) -> usize {
        self.inner.lock().unwrap().mutations
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    /// Number of rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.inner.lock().unwrap().rollbacks
    }

    /// Committed entries of a collection, with positional indices.
    pub fn entries(&self, scope: &ParentScope, kind: SubResourceKind) -> Vec<SubResourceEntry> {
        let inner = self.inner.lock().unwrap();
        positional(
            inner
                .committed
                .collections
                .get(&(scope.clone(), kind))
                .cloned()
                .unwrap_or_default(),
        )
    }

    /// Committed parent, if any.
    pub fn parent(&self, parent_type: ParentType, name: &str) -> Option<ParentResource> {
        let inner = self.inner.lock().unwrap();
        inner
            .committed
            .parents
            .get(&(parent_type, name.to_string()))
            .cloned()
    }

    /// Runs a mutation against the transaction's staged snapshot.
    fn mutate<F>(&self, txn: &TransactionHandle, call: String, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Snapshot) -> Result<()>,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        inner.mutations += 1;
        if inner.fail_at == Some(inner.mutations) {
            return Err(DataplaneError::api_error(400, "injected failure").into());
        }
        let staged = inner
            .staged
            .get_mut(&txn.id)
            .ok_or_else(|| not_found(format!("transaction {}", txn.id)))?;
        apply(staged)
    }
}

fn positional(entries: Vec<SubResourceEntry>) -> Vec<SubResourceEntry> {
    (0_i64..)
        .zip(entries)
        .map(|(index, entry)| entry.with_index(index))
        .collect()
}

#[async_trait]
impl TransactionApi for MemoryDataplane {
    async fn begin(&self) -> Result<TransactionHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("txn-{}", inner.next_id);
        inner.calls.push(format!("begin {id}"));
        let snapshot = inner.committed.clone();
        inner.staged.insert(id.clone(), snapshot);
        Ok(TransactionHandle {
            id,
            version: inner.version,
        })
    }

    async fn commit(&self, txn: &TransactionHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("commit {}", txn.id));
        let staged = inner
            .staged
            .remove(&txn.id)
            .ok_or_else(|| not_found(format!("transaction {}", txn.id)))?;
        inner.committed = staged;
        inner.version += 1;
        inner.commits += 1;
        Ok(())
    }

    async fn rollback(&self, txn: &TransactionHandle) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("rollback {}", txn.id));
        inner.rollbacks += 1;
        inner
            .staged
            .remove(&txn.id)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("transaction {}", txn.id)))
    }
}

#[async_trait]
impl ParentAdapter for MemoryDataplane {
    async fn get_parent(
        &self,
        parent_type: ParentType,
        name: &str,
    ) -> Result<Option<ParentResource>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("get {parent_type} '{name}'"));
        Ok(inner
            .committed
            .parents
            .get(&(parent_type, name.to_string()))
            .cloned())
    }

    async fn create_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()> {
        let call = format!("create {}", parent.scope());
        self.mutate(txn, call, |staged| {
            let key = (parent.parent_type(), parent.name().to_string());
            if staged.parents.contains_key(&key) {
                return Err(DataplaneError::Conflict {
                    message: format!("{} already exists", parent.scope()),
                }
                .into());
            }
            staged.parents.insert(key, parent.clone());
            Ok(())
        })
    }

    async fn update_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()> {
        let call = format!("update {}", parent.scope());
        self.mutate(txn, call, |staged| {
            let key = (parent.parent_type(), parent.name().to_string());
            let slot = staged
                .parents
                .get_mut(&key)
                .ok_or_else(|| not_found(parent.scope().to_string()))?;
            *slot = parent.clone();
            Ok(())
        })
    }

    async fn delete_parent(
        &self,
        parent_type: ParentType,
        name: &str,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let scope = ParentScope::new(parent_type, name);
        self.mutate(txn, format!("delete {scope}"), |staged| {
            staged
                .parents
                .remove(&(parent_type, name.to_string()))
                .ok_or_else(|| not_found(scope.to_string()))?;
            staged.collections.retain(|(owner, _), _| *owner != scope);
            Ok(())
        })
    }
}

#[async_trait]
impl CollectionAdapter for MemoryDataplane {
    async fn list(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
    ) -> Result<Vec<SubResourceEntry>> {
        let entries = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(format!("list {scope} {kind}"));
            inner.committed.require_parent(scope)?;
            inner
                .committed
                .collections
                .get(&(scope.clone(), kind))
                .cloned()
                .unwrap_or_default()
        };
        Ok(positional(entries))
    }

    async fn create(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
        index: i64,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let call = format!("create {scope} {kind} {index}");
        self.mutate(txn, call, |staged| {
            staged.require_parent(scope)?;
            let entries = staged
                .collections
                .entry((scope.clone(), kind))
                .or_default();
            if kind.addressed_by_name() {
                if entries.iter().any(|e| e.name == entry.name) {
                    return Err(DataplaneError::Conflict {
                        message: format!("{} already exists", entry.describe()),
                    }
                    .into());
                }
                entries.push(entry.clone());
            } else {
                let pos = usize::try_from(index).unwrap_or(0).min(entries.len());
                entries.insert(pos, entry.clone());
            }
            Ok(())
        })
    }

    async fn update_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        current_name: Option<&str>,
        scope: &ParentScope,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let call = format!("update {scope} {kind} {index}");
        self.mutate(txn, call, |staged| {
            let entries = staged
                .collections
                .get_mut(&(scope.clone(), kind))
                .ok_or_else(|| not_found(format!("{kind} {index} in {scope}")))?;
            let pos = Snapshot::locate(entries, kind, index, current_name)
                .ok_or_else(|| not_found(format!("{kind} {index} in {scope}")))?;
            entries[pos] = entry.clone();
            Ok(())
        })
    }

    async fn delete_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        name: Option<&str>,
        scope: &ParentScope,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let call = format!("delete {scope} {kind} {index}");
        self.mutate(txn, call, |staged| {
            let entries = staged
                .collections
                .get_mut(&(scope.clone(), kind))
                .ok_or_else(|| not_found(format!("{kind} {index} in {scope}")))?;
            let pos = Snapshot::locate(entries, kind, index, name)
                .ok_or_else(|| not_found(format!("{kind} {index} in {scope}")))?;
            entries.remove(pos);
            Ok(())
        })
    }
}
