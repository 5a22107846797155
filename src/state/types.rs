//! State types recorded by the caller after each lifecycle call.
//!
//! The state is a hint, not a source of truth: every reconciliation reads the
//! remote configuration afresh. What the state adds is the order the caller
//! last applied, which the read path prefers over the remote's own order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind};
use crate::planner::PlanSummary;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept.
pub const MAX_HISTORY: usize = 20;

/// The recorded state of one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackState {
    /// State format version.
    pub version: String,
    /// Stack name.
    pub stack: String,
    /// Hash of the last applied stack file.
    #[serde(default)]
    pub config_hash: String,
    /// Parent sections as last observed or applied.
    #[serde(default)]
    pub parents: Vec<ParentResource>,
    /// Sub-collections, in their recorded order.
    #[serde(default)]
    pub collections: Vec<CollectionState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent lifecycle calls, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// One recorded sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// Owning parent.
    pub scope: ParentScope,
    /// Collection kind.
    pub kind: SubResourceKind,
    /// Entries in order.
    pub entries: Vec<SubResourceEntry>,
}

/// A single entry in the stack history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the call ran.
    pub timestamp: DateTime<Utc>,
    /// Type of call.
    pub operation: LifecycleOperation,
    /// Stack file hash at the time.
    pub config_hash: String,
    /// What the call changed.
    #[serde(default)]
    pub summary: PlanSummary,
    /// Transaction used, if any.
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Whether the call succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle calls that mutate a stack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOperation {
    /// First apply.
    Create,
    /// Reconciliation of an existing stack.
    Update,
    /// Teardown.
    Delete,
}

impl std::fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{text}")
    }
}

impl StackState {
    /// Creates an empty state for a stack.
    #[must_use]
    pub fn new(stack: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            stack: stack.to_string(),
            config_hash: String::new(),
            parents: Vec::new(),
            collections: Vec::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Returns true if the state records no parent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Gets a recorded parent.
    #[must_use]
    pub fn parent(&self, parent_type: ParentType, name: &str) -> Option<&ParentResource> {
        self.parents
            .iter()
            .find(|p| p.parent_type() == parent_type && p.name() == name)
    }

    /// Gets the recorded entries of a collection.
    #[must_use]
    pub fn collection(&self, scope: &ParentScope, kind: SubResourceKind) -> Option<&[SubResourceEntry]> {
        self.collections
            .iter()
            .find(|c| &c.scope == scope && c.kind == kind)
            .map(|c| c.entries.as_slice())
    }

    /// Scopes of every recorded parent.
    #[must_use]
    pub fn scopes(&self) -> Vec<ParentScope> {
        self.parents.iter().map(ParentResource::scope).collect()
    }

    /// Total number of recorded entries across collections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.collections.iter().map(|c| c.entries.len()).sum()
    }

    /// Carries history over from an older state of the same stack.
    pub fn inherit_history(&mut self, previous: &Self) {
        self.history.clone_from(&previous.history);
    }

    /// Records a lifecycle call, dropping the oldest entries past
    /// [`MAX_HISTORY`].
    pub fn record(&mut self, mut entry: HistoryEntry) {
        entry.config_hash.clone_from(&self.config_hash);
        self.history.push(entry);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.last_updated = Utc::now();
    }

    /// Returns the most recent history entry.
    #[must_use]
    pub fn last_operation(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn success(
        operation: LifecycleOperation,
        summary: PlanSummary,
        transaction_id: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: String::new(),
            summary,
            transaction_id,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failure(operation: LifecycleOperation, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: String::new(),
            summary: PlanSummary::default(),
            transaction_id: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Backend;
    use serde_json::json;

    fn acl(name: &str, index: i64) -> SubResourceEntry {
        SubResourceEntry::from_object(
            SubResourceKind::Acl,
            json!({"acl_name": name, "criterion": "path_beg", "value": "/"}),
            index,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let scope = ParentScope::backend("web_be");
        let mut state = StackState::new("web");
        assert!(state.is_empty());

        state
            .parents
            .push(ParentResource::Backend(Backend::named("web_be")));
        state.collections.push(CollectionState {
            scope: scope.clone(),
            kind: SubResourceKind::Acl,
            entries: vec![acl("a", 0), acl("b", 1)],
        });

        assert!(state.parent(ParentType::Backend, "web_be").is_some());
        assert!(state.parent(ParentType::Frontend, "web_be").is_none());
        assert_eq!(state.collection(&scope, SubResourceKind::Acl).unwrap().len(), 2);
        assert!(state.collection(&scope, SubResourceKind::Server).is_none());
        assert_eq!(state.entry_count(), 2);
        assert_eq!(state.scopes(), vec![scope]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = StackState::new("web");
        state.config_hash = String::from("abc");
        for _ in 0..MAX_HISTORY + 5 {
            state.record(HistoryEntry::success(
                LifecycleOperation::Update,
                PlanSummary::default(),
                None,
            ));
        }
        state.record(HistoryEntry::failure(LifecycleOperation::Delete, "boom"));

        assert_eq!(state.history.len(), MAX_HISTORY);
        let last = state.last_operation().unwrap();
        assert!(!last.success);
        assert_eq!(last.config_hash, "abc");
        assert_eq!(last.operation, LifecycleOperation::Delete);
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = StackState::new("web");
        state
            .parents
            .push(ParentResource::Backend(Backend::named("web_be")));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["version"], STATE_VERSION);
        assert_eq!(json["parents"][0]["parent_type"], "backend");

        let back: StackState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
