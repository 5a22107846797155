//! Reconstruction of collection order after a read.
//!
//! The Data Plane API reports entries in its own order. When the caller still
//! holds the order it last applied, that order is preferred verbatim: entries
//! are matched back by name, or by content for unnamed kinds, and keep their
//! prior index. Entries with no prior counterpart follow in remote order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::SubResourceEntry;

/// How to order observed entries when reading a stack back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStrategy {
    /// Keep the caller's prior order and indices where entries still match.
    #[default]
    PreferPriorOrder,
    /// Report entries exactly as the remote orders them.
    ObservedOrder,
}

impl OrderStrategy {
    /// Arranges observed entries, optionally against a prior ordering.
    #[must_use]
    pub fn arrange(
        self,
        prior: Option<&[SubResourceEntry]>,
        observed: Vec<SubResourceEntry>,
    ) -> Vec<SubResourceEntry> {
        match (self, prior) {
            (Self::PreferPriorOrder, Some(prior)) if !prior.is_empty() => {
                arrange_by_prior(prior, observed)
            }
            _ => {
                let mut observed = observed;
                observed.sort_by_key(|entry| entry.index);
                observed
            }
        }
    }
}

fn arrange_by_prior(
    prior: &[SubResourceEntry],
    observed: Vec<SubResourceEntry>,
) -> Vec<SubResourceEntry> {
    let mut remaining: Vec<Option<SubResourceEntry>> = observed.into_iter().map(Some).collect();
    let mut arranged = Vec::with_capacity(remaining.len());
    let mut used: HashSet<i64> = HashSet::new();

    for before in prior {
        let found = remaining.iter().position(|slot| {
            slot.as_ref().is_some_and(|entry| match &before.name {
                Some(name) => entry.name.as_deref() == Some(name.as_str()),
                None => entry.name.is_none() && entry.signature() == before.signature(),
            })
        });

        if let Some(entry) = found.and_then(|pos| remaining[pos].take()) {
            used.insert(before.index);
            arranged.push(entry.with_index(before.index));
        }
    }

    let mut leftovers: Vec<SubResourceEntry> = remaining.into_iter().flatten().collect();
    leftovers.sort_by_key(|entry| entry.index);

    let mut next = arranged.iter().map(|e| e.index + 1).max().unwrap_or(0);
    for entry in leftovers {
        let index = if used.contains(&entry.index) || entry.index < next {
            next
        } else {
            entry.index
        };
        used.insert(index);
        next = next.max(index + 1);
        arranged.push(entry.with_index(index));
    }

    arranged
}
