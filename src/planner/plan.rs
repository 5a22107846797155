//! Operation plan types.
//!
//! A plan is the ordered list of remote operations that turns an observed
//! sub-collection into the desired one. It has no move operation: an index
//! change is always a delete followed by a create.

use serde::{Deserialize, Serialize};

use crate::model::{SubResourceEntry, SubResourceKind};

/// Why an operation was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Same identity and position, different content.
    ContentChanged,
    /// Same content under a new name.
    Renamed,
    /// Same identity, different position.
    Moved,
    /// Present remotely, absent from the desired set.
    Removed,
    /// Absent remotely.
    Added,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ContentChanged => "content changed",
            Self::Renamed => "renamed",
            Self::Moved => "index changed",
            Self::Removed => "not declared",
            Self::Added => "new",
        };
        write!(f, "{text}")
    }
}

/// A single remote operation against one sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlannedOperation<E> {
    /// Replace the entry at `index`, possibly under a new name.
    UpdateInPlace {
        /// Position being overwritten.
        index: i64,
        /// Name the entry currently has remotely.
        current_name: Option<String>,
        /// Replacement content.
        entry: E,
        /// Why.
        reason: ChangeReason,
    },
    /// Remove the entry at `index`.
    Delete {
        /// Position being removed.
        index: i64,
        /// Name of the removed entry.
        name: Option<String>,
        /// Why.
        reason: ChangeReason,
    },
    /// Insert `entry` at `index`.
    Create {
        /// Target position.
        index: i64,
        /// New entry.
        entry: E,
        /// Why.
        reason: ChangeReason,
    },
}

impl<E> PlannedOperation<E> {
    /// Position the operation targets.
    #[must_use]
    pub const fn index(&self) -> i64 {
        match self {
            Self::UpdateInPlace { index, .. }
            | Self::Delete { index, .. }
            | Self::Create { index, .. } => *index,
        }
    }

    /// Verb used in logs and CLI output.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::UpdateInPlace { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Create { .. } => "create",
        }
    }

    /// Why the operation was planned.
    #[must_use]
    pub const fn reason(&self) -> ChangeReason {
        match self {
            Self::UpdateInPlace { reason, .. }
            | Self::Delete { reason, .. }
            | Self::Create { reason, .. } => *reason,
        }
    }

    /// Returns true for deletes.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Returns true for creates.
    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create { .. })
    }
}

impl PlannedOperation<SubResourceEntry> {
    /// Describes the operation, including the entry it targets.
    #[must_use]
    pub fn describe(&self, kind: SubResourceKind) -> String {
        match self {
            Self::UpdateInPlace {
                index,
                current_name: Some(current),
                entry,
                ..
            } if entry.name.as_deref() != Some(current.as_str()) => format!(
                "rename {kind} '{current}' to '{}' at index {index}",
                entry.name.as_deref().unwrap_or_default()
            ),
            Self::UpdateInPlace { index, entry, .. } => {
                format!("update {} at index {index}", entry.describe())
            }
            Self::Delete {
                index,
                name: Some(name),
                ..
            } => format!("delete {kind} '{name}' at index {index}"),
            Self::Delete { index, .. } => format!("delete {kind} at index {index}"),
            Self::Create { index, entry, .. } => {
                format!("create {} at index {index}", entry.describe())
            }
        }
    }
}

/// Counts of the decisions behind a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Entries already in place.
    pub unchanged: usize,
    /// Entries whose index differed but whose content did not.
    pub swapped: usize,
    /// Entries updated in place under a new name.
    pub renamed: usize,
    /// Entries updated in place with new content.
    pub updated: usize,
    /// Entries deleted and recreated at a new index.
    pub moved: usize,
    /// New entries.
    pub created: usize,
    /// Removed entries.
    pub deleted: usize,
}

impl PlanSummary {
    /// Returns true if any remote change is needed.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.renamed + self.updated + self.moved + self.created + self.deleted > 0
    }

    /// Adds another summary into this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.unchanged += other.unchanged;
        self.swapped += other.swapped;
        self.renamed += other.renamed;
        self.updated += other.updated;
        self.moved += other.moved;
        self.created += other.created;
        self.deleted += other.deleted;
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to rename, {} to move, {} to delete, {} unchanged",
            self.created,
            self.updated,
            self.renamed,
            self.moved,
            self.deleted,
            self.unchanged + self.swapped
        )
    }
}

/// An ordered operation plan for one sub-collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationPlan<E> {
    /// Operations in execution order.
    pub operations: Vec<PlannedOperation<E>>,
    /// Decision counts.
    pub summary: PlanSummary,
}

impl<E> Default for OperationPlan<E> {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
            summary: PlanSummary::default(),
        }
    }
}

impl<E> OperationPlan<E> {
    /// Returns true if the plan has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Iterates over the operations in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, PlannedOperation<E>> {
        self.operations.iter()
    }
}

impl<'a, E> IntoIterator for &'a OperationPlan<E> {
    type Item = &'a PlannedOperation<E>;
    type IntoIter = std::slice::Iter<'a, PlannedOperation<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acl(name: &str) -> SubResourceEntry {
        SubResourceEntry::from_object(
            SubResourceKind::Acl,
            json!({"acl_name": name, "criterion": "path_beg", "value": "/api"}),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_describe_operations() {
        let rename = PlannedOperation::UpdateInPlace {
            index: 2,
            current_name: Some(String::from("old")),
            entry: acl("new"),
            reason: ChangeReason::Renamed,
        };
        assert_eq!(
            rename.describe(SubResourceKind::Acl),
            "rename acl 'old' to 'new' at index 2"
        );

        let create = PlannedOperation::Create {
            index: 0,
            entry: acl("is_api"),
            reason: ChangeReason::Added,
        };
        assert_eq!(
            create.describe(SubResourceKind::Acl),
            "create acl 'is_api' at index 0"
        );

        let delete: PlannedOperation<SubResourceEntry> = PlannedOperation::Delete {
            index: 4,
            name: None,
            reason: ChangeReason::Removed,
        };
        assert_eq!(
            delete.describe(SubResourceKind::HttpRequestRule),
            "delete http-request rule at index 4"
        );
    }

    #[test]
    fn test_summary_absorb_and_display() {
        let mut total = PlanSummary::default();
        total.absorb(&PlanSummary {
            created: 2,
            unchanged: 1,
            ..PlanSummary::default()
        });
        total.absorb(&PlanSummary {
            deleted: 1,
            swapped: 1,
            ..PlanSummary::default()
        });

        assert!(total.has_changes());
        assert_eq!(
            total.to_string(),
            "2 to create, 0 to update, 0 to rename, 0 to move, 1 to delete, 2 unchanged"
        );
    }
}
