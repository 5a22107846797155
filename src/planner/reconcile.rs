//! Ordered-collection reconciliation.
//!
//! Computes the minimal, order-aware set of operations that transforms an
//! observed sub-collection into the desired one. Entries are matched by
//! identity first (name, or position for unnamed kinds), then by content
//! signature to detect renames.
//!
//! Emitted plans are ordered so that indices stay valid while they execute:
//! in-place updates first (no cardinality change), then every delete in
//! strictly descending index order, then creates in ascending index order.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plan::{ChangeReason, OperationPlan, PlanSummary, PlannedOperation};

/// An entry the reconciler can match and compare.
pub trait Reconcilable: Clone {
    /// Content identity, independent of name and index.
    type Signature: Eq + Hash;

    /// Entry name, if the kind is named.
    fn name(&self) -> Option<&str>;

    /// Position within the collection.
    fn index(&self) -> i64;

    /// Content signature.
    fn signature(&self) -> Self::Signature;
}

/// How to treat a named entry whose content is unchanged but whose reported
/// index differs from the desired one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionPolicy {
    /// Only an exchange is left alone: the slot the entry should occupy holds
    /// another observed entry with identical content, and that entry is
    /// desired, unchanged, at the slot this one occupies. Anything else is
    /// moved, and renames are only detected in place.
    #[default]
    Exchange,
    /// Content-equal entries are in place whatever index the remote reports.
    ContentIdentity,
}

/// Identity used to pair desired and observed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EntryKey<'a> {
    Named(&'a str),
    Positional(i64),
}

impl<'a> EntryKey<'a> {
    fn of<E: Reconcilable>(entry: &'a E) -> Self {
        entry
            .name()
            .map_or(Self::Positional(entry.index()), Self::Named)
    }
}

/// Lookup tables over an observed collection.
struct Observed<'a, E: Reconcilable> {
    entries: &'a [E],
    signatures: Vec<E::Signature>,
    by_key: HashMap<EntryKey<'a>, usize>,
    by_index: HashMap<i64, usize>,
    by_signature: HashMap<E::Signature, Vec<usize>>,
}

impl<'a, E: Reconcilable> Observed<'a, E> {
    fn new(entries: &'a [E]) -> Self {
        let mut by_key = HashMap::with_capacity(entries.len());
        let mut by_index = HashMap::with_capacity(entries.len());
        let mut by_signature: HashMap<E::Signature, Vec<usize>> = HashMap::new();

        for (pos, entry) in entries.iter().enumerate() {
            by_key.entry(EntryKey::of(entry)).or_insert(pos);
            by_index.entry(entry.index()).or_insert(pos);
            by_signature.entry(entry.signature()).or_default().push(pos);
        }

        Self {
            entries,
            signatures: entries.iter().map(Reconcilable::signature).collect(),
            by_key,
            by_index,
            by_signature,
        }
    }

    /// Whether the entry at `pos`, desired at `want`'s index, traded places
    /// with another observed entry of identical content.
    fn is_exchanged(&self, pos: usize, want: &E, desired_by_name: &HashMap<&str, &E>) -> bool {
        let Some(partner) = self.by_index.get(&want.index()).copied() else {
            return false;
        };
        if partner == pos || self.signatures[partner] != self.signatures[pos] {
            return false;
        }
        let entries: &'a [E] = self.entries;
        let Some(partner_name) = entries[partner].name() else {
            return false;
        };
        self.by_key.get(&EntryKey::Named(partner_name)) == Some(&partner)
            && desired_by_name.get(partner_name).is_some_and(|other| {
                other.index() == self.entries[pos].index()
                    && other.signature() == self.signatures[partner]
            })
    }

    /// Picks the observed entry `want` was renamed from: same content,
    /// unclaimed, with a name no desired entry uses, preferring the one
    /// already at the desired index.
    fn rename_source(
        &self,
        want: &E,
        signature: &E::Signature,
        claimed: &[bool],
        desired_by_name: &HashMap<&str, &E>,
    ) -> Option<usize> {
        let candidates = self.by_signature.get(signature)?;
        let mut free = candidates.iter().copied().filter(|pos| {
            !claimed[*pos]
                && self.entries[*pos]
                    .name()
                    .is_some_and(|name| !desired_by_name.contains_key(name))
        });

        let first = free.next()?;
        if self.entries[first].index() == want.index() {
            return Some(first);
        }
        Some(
            free.find(|pos| self.entries[*pos].index() == want.index())
                .unwrap_or(first),
        )
    }
}

/// Reconciles one ordered sub-collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionReconciler {
    policy: PositionPolicy,
}

impl CollectionReconciler {
    /// Creates a reconciler with the default position policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            policy: PositionPolicy::Exchange,
        }
    }

    /// Sets the position policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PositionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the position policy.
    #[must_use]
    pub const fn policy(&self) -> PositionPolicy {
        self.policy
    }

    /// Computes the plan turning `observed` into `desired`.
    ///
    /// Never fails; desired index ties are left to caller-side validation.
    #[must_use]
    pub fn reconcile<E: Reconcilable>(&self, desired: &[E], observed: &[E]) -> OperationPlan<E> {
        let lookup = Observed::new(observed);
        let mut desired_by_name: HashMap<&str, &E> = HashMap::with_capacity(desired.len());
        for want in desired {
            if let Some(name) = want.name() {
                desired_by_name.entry(name).or_insert(want);
            }
        }

        let mut claimed = vec![false; observed.len()];
        let mut summary = PlanSummary::default();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        let mut creates = Vec::new();

        for want in desired {
            let signature = want.signature();
            let key = EntryKey::of(want);

            let matched = lookup.by_key.get(&key).copied().filter(|pos| !claimed[*pos]);
            if let Some(pos) = matched {
                claimed[pos] = true;
                let have = &observed[pos];
                let same_content = lookup.signatures[pos] == signature;

                if have.index() == want.index() {
                    if same_content {
                        summary.unchanged += 1;
                    } else {
                        debug!("Entry at index {} changed content", have.index());
                        summary.updated += 1;
                        updates.push(PlannedOperation::UpdateInPlace {
                            index: have.index(),
                            current_name: have.name().map(str::to_string),
                            entry: want.clone(),
                            reason: ChangeReason::ContentChanged,
                        });
                    }
                } else if same_content && self.is_swap(&lookup, pos, want, &desired_by_name) {
                    debug!(
                        "Entry '{}' reported at index {} instead of {}, content unchanged",
                        want.name().unwrap_or_default(),
                        have.index(),
                        want.index()
                    );
                    summary.swapped += 1;
                } else {
                    debug!(
                        "Entry '{}' moves from index {} to {}",
                        want.name().unwrap_or_default(),
                        have.index(),
                        want.index()
                    );
                    summary.moved += 1;
                    deletes.push(PlannedOperation::Delete {
                        index: have.index(),
                        name: have.name().map(str::to_string),
                        reason: ChangeReason::Moved,
                    });
                    creates.push(PlannedOperation::Create {
                        index: want.index(),
                        entry: want.clone(),
                        reason: ChangeReason::Moved,
                    });
                }
                continue;
            }

            let renamed = match key {
                EntryKey::Named(_) => lookup
                    .rename_source(want, &signature, &claimed, &desired_by_name)
                    .filter(|pos| {
                        self.policy == PositionPolicy::ContentIdentity
                            || observed[*pos].index() == want.index()
                    }),
                EntryKey::Positional(_) => None,
            };

            if let Some(pos) = renamed {
                claimed[pos] = true;
                let have = &observed[pos];
                debug!(
                    "Entry at index {} renamed from '{}' to '{}'",
                    have.index(),
                    have.name().unwrap_or_default(),
                    want.name().unwrap_or_default()
                );
                summary.renamed += 1;
                updates.push(PlannedOperation::UpdateInPlace {
                    index: have.index(),
                    current_name: have.name().map(str::to_string),
                    entry: want.clone(),
                    reason: ChangeReason::Renamed,
                });
            } else {
                summary.created += 1;
                creates.push(PlannedOperation::Create {
                    index: want.index(),
                    entry: want.clone(),
                    reason: ChangeReason::Added,
                });
            }
        }

        for (pos, have) in observed.iter().enumerate() {
            if !claimed[pos] {
                summary.deleted += 1;
                deletes.push(PlannedOperation::Delete {
                    index: have.index(),
                    name: have.name().map(str::to_string),
                    reason: ChangeReason::Removed,
                });
            }
        }

        updates.sort_by_key(PlannedOperation::index);
        deletes.sort_by_key(|op| std::cmp::Reverse(op.index()));
        creates.sort_by_key(PlannedOperation::index);

        let mut operations = updates;
        operations.append(&mut deletes);
        operations.append(&mut creates);

        OperationPlan {
            operations,
            summary,
        }
    }

    fn is_swap<E: Reconcilable>(
        &self,
        lookup: &Observed<'_, E>,
        pos: usize,
        want: &E,
        desired_by_name: &HashMap<&str, &E>,
    ) -> bool {
        match self.policy {
            PositionPolicy::Exchange => lookup.is_exchanged(pos, want, desired_by_name),
            PositionPolicy::ContentIdentity => true,
        }
    }
}
