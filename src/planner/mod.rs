//! Planning module for ordered sub-collections.
//!
//! This module compares desired and observed collections and produces
//! ordered operation plans, and reconstructs a caller's preferred order when
//! reading collections back.

mod order;
mod plan;
mod reconcile;

pub use order::OrderStrategy;
pub use plan::{ChangeReason, OperationPlan, PlanSummary, PlannedOperation};
pub use reconcile::{CollectionReconciler, PositionPolicy, Reconcilable};
