//! Stack lifecycle orchestration.
//!
//! A stack is one backend and/or one frontend with their sub-collections.
//! [`StackOrchestrator`] sequences reconciliation across them: parents
//! before children on the way up, children before parents on the way down,
//! and every remote mutation of one call inside a single transaction.

mod desired;

pub use desired::{DesiredCollection, DesiredParent, DesiredStack};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dataplane::DataplaneApi;
use crate::error::Result;
use crate::model::{ParentScope, ParentType, SubResourceEntry, SubResourceKind};
use crate::planner::{CollectionReconciler, OrderStrategy, PlanSummary, PositionPolicy};
use crate::state::{CollectionState, HistoryEntry, LifecycleOperation, StackState};
use crate::transaction::{Batch, ExecutionReport, ParentOperation, TransactionCoordinator};

/// The batches a lifecycle call would execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackPlan {
    /// Stack name.
    pub stack: String,
    /// Batches in execution order.
    pub batches: Vec<Batch>,
    /// Entry-level decision counts.
    pub summary: PlanSummary,
}

impl StackPlan {
    /// Returns true if executing the plan would change anything remotely.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.batches.iter().any(|batch| !batch.is_empty())
    }

    /// Parent operations, in execution order.
    pub fn parent_operations(&self) -> impl Iterator<Item = &ParentOperation> {
        self.batches.iter().filter_map(|batch| match batch {
            Batch::Parent { operation } => Some(operation),
            Batch::Collection { .. } => None,
        })
    }

    /// Total number of remote operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Result of a lifecycle call.
#[derive(Debug, Clone, Serialize)]
pub struct StackOutcome {
    /// State to record for the next call.
    pub state: StackState,
    /// Entry-level decision counts.
    pub summary: PlanSummary,
    /// What was executed.
    pub report: ExecutionReport,
}

/// Differences between the declared stack and what is deployed.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    /// Stack file hash differs from the last applied one.
    pub config_changed: bool,
    /// Hash recorded by the last apply, if any.
    pub last_applied_hash: Option<String>,
    /// What an apply would do now.
    pub plan: StackPlan,
}

impl DriftReport {
    /// Returns true if the remote configuration differs from the stack file.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.plan.has_changes()
    }
}

/// Runs stack lifecycle calls against a Data Plane API.
pub struct StackOrchestrator<'a, A> {
    api: &'a A,
    reconciler: CollectionReconciler,
    order: OrderStrategy,
}

impl<'a, A: DataplaneApi> StackOrchestrator<'a, A> {
    /// Creates an orchestrator with default policies.
    #[must_use]
    pub const fn new(api: &'a A) -> Self {
        Self {
            api,
            reconciler: CollectionReconciler::new(),
            order: OrderStrategy::PreferPriorOrder,
        }
    }

    /// Sets how content-equal index differences are treated.
    #[must_use]
    pub const fn with_position_policy(mut self, policy: PositionPolicy) -> Self {
        self.reconciler = self.reconciler.with_policy(policy);
        self
    }

    /// Sets how entries are ordered when reading a stack back.
    #[must_use]
    pub const fn with_order_strategy(mut self, order: OrderStrategy) -> Self {
        self.order = order;
        self
    }

    /// Creates every declared parent and entry in one transaction.
    ///
    /// Nothing is read first: an already existing parent makes the call fail
    /// and roll back.
    ///
    /// # Errors
    ///
    /// Returns the first failing operation after rollback.
    pub async fn create(&self, desired: &DesiredStack) -> Result<StackOutcome> {
        info!("Creating stack '{}'", desired.name);

        let mut summary = PlanSummary::default();
        let mut batches: Vec<Batch> = desired
            .parents
            .iter()
            .map(|parent| Batch::Parent {
                operation: ParentOperation::Create {
                    resource: parent.resource.clone(),
                },
            })
            .collect();

        for parent in &desired.parents {
            let scope = parent.scope();
            for collection in &parent.collections {
                let plan = self.reconciler.reconcile(&collection.entries, &[]);
                summary.absorb(&plan.summary);
                if !plan.is_empty() {
                    batches.push(Batch::Collection {
                        scope: scope.clone(),
                        kind: collection.kind,
                        plan,
                        best_effort: false,
                    });
                }
            }
        }

        let report = self.execute(&batches).await?;
        let mut state = desired.to_state();
        state.record(HistoryEntry::success(
            LifecycleOperation::Create,
            summary,
            report.transaction_id.clone(),
        ));

        info!("Created stack '{}': {summary}", desired.name);
        Ok(StackOutcome {
            state,
            summary,
            report,
        })
    }

    /// Reads the deployed stack.
    ///
    /// Parents declared now or recorded in `prior` are looked up. With
    /// [`OrderStrategy::PreferPriorOrder`] each collection is reported in the
    /// prior order where entries still match.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote read fails.
    pub async fn read(
        &self,
        desired: &DesiredStack,
        prior: Option<&StackState>,
    ) -> Result<StackOutcome> {
        let mut state = StackState::new(&desired.name);
        if let Some(prior) = prior {
            state.config_hash.clone_from(&prior.config_hash);
            state.inherit_history(prior);
        }

        for scope in known_scopes(desired, prior) {
            let Some(parent) = self
                .api
                .get_parent(scope.parent_type, &scope.parent_name)
                .await?
            else {
                debug!("{scope} not found remotely");
                continue;
            };
            state.parents.push(parent);

            for &kind in SubResourceKind::kinds_for(scope.parent_type) {
                let observed = self.api.list(kind, &scope).await?;
                let recorded = prior.and_then(|p| p.collection(&scope, kind));
                let entries = self.order.arrange(recorded, observed);
                if !entries.is_empty() {
                    state.collections.push(CollectionState {
                        scope: scope.clone(),
                        kind,
                        entries,
                    });
                }
            }
        }

        Ok(StackOutcome {
            state,
            summary: PlanSummary::default(),
            report: ExecutionReport::default(),
        })
    }

    /// Computes what an update would execute, without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote read of a declared parent fails.
    pub async fn plan(&self, desired: &DesiredStack, prior: Option<&StackState>) -> Result<StackPlan> {
        let mut summary = PlanSummary::default();
        let mut batches = Vec::new();
        let mut children = Vec::new();

        for parent in &desired.parents {
            let scope = parent.scope();
            let observed = self
                .api
                .get_parent(scope.parent_type, &scope.parent_name)
                .await?;

            match &observed {
                None => {
                    debug!("{scope} is missing, will be created");
                    batches.push(Batch::Parent {
                        operation: ParentOperation::Create {
                            resource: parent.resource.clone(),
                        },
                    });
                }
                Some(current) => {
                    let changed = parent.resource.changed_fields(current);
                    if !changed.is_empty() {
                        debug!("{scope} differs in {}", changed.join(", "));
                        batches.push(Batch::Parent {
                            operation: ParentOperation::Update {
                                resource: parent.resource.clone(),
                                changed,
                            },
                        });
                    }
                }
            }

            for &kind in SubResourceKind::kinds_for(scope.parent_type) {
                let observed_entries = if observed.is_some() {
                    self.observe(kind, &scope).await?
                } else {
                    Vec::new()
                };
                let plan = self
                    .reconciler
                    .reconcile(parent.entries(kind), &observed_entries);
                summary.absorb(&plan.summary);
                if !plan.is_empty() {
                    children.push(Batch::Collection {
                        scope: scope.clone(),
                        kind,
                        plan,
                        best_effort: false,
                    });
                }
            }
        }
        batches.append(&mut children);

        let mut removed: Vec<ParentScope> = known_scopes(desired, prior)
            .into_iter()
            .filter(|scope| desired.parent(scope.parent_type, &scope.parent_name).is_none())
            .collect();
        sort_for_teardown(&mut removed);
        batches.extend(self.teardown(&removed, &mut summary).await?);

        Ok(StackPlan {
            stack: desired.name.clone(),
            batches,
            summary,
        })
    }

    /// Reconciles the deployed stack to the declared one.
    ///
    /// Parents are created or updated first, then every collection plan runs,
    /// then parents no longer declared are torn down.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails, or the first failing operation after
    /// rollback.
    pub async fn update(
        &self,
        desired: &DesiredStack,
        prior: Option<&StackState>,
    ) -> Result<StackOutcome> {
        info!("Updating stack '{}'", desired.name);

        let plan = self.plan(desired, prior).await?;
        let report = self.execute(&plan.batches).await?;

        let mut state = desired.to_state();
        if let Some(prior) = prior {
            state.inherit_history(prior);
        }
        state.record(HistoryEntry::success(
            LifecycleOperation::Update,
            plan.summary,
            report.transaction_id.clone(),
        ));

        info!("Updated stack '{}': {}", desired.name, plan.summary);
        Ok(StackOutcome {
            state,
            summary: plan.summary,
            report,
        })
    }

    /// Tears down every known parent of the stack.
    ///
    /// Children go before their parent and the frontend before the backend.
    /// Failures to list or delete children are logged and skipped; the
    /// parent deletions themselves must succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if a parent lookup fails, or the first failing parent
    /// deletion after rollback.
    pub async fn delete(
        &self,
        desired: &DesiredStack,
        prior: Option<&StackState>,
    ) -> Result<StackOutcome> {
        info!("Deleting stack '{}'", desired.name);

        let mut scopes = known_scopes(desired, prior);
        sort_for_teardown(&mut scopes);

        let mut summary = PlanSummary::default();
        let batches = self.teardown(&scopes, &mut summary).await?;
        let report = self.execute(&batches).await?;

        let mut state = StackState::new(&desired.name);
        if let Some(prior) = prior {
            state.inherit_history(prior);
        }
        state.record(HistoryEntry::success(
            LifecycleOperation::Delete,
            summary,
            report.transaction_id.clone(),
        ));

        if report.skipped > 0 {
            warn!(
                "Deleted stack '{}' with {} child operations skipped",
                desired.name, report.skipped
            );
        } else {
            info!("Deleted stack '{}'", desired.name);
        }
        Ok(StackOutcome {
            state,
            summary,
            report,
        })
    }

    /// Compares the declared stack with the deployed one.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote read fails.
    pub async fn drift(
        &self,
        desired: &DesiredStack,
        prior: Option<&StackState>,
    ) -> Result<DriftReport> {
        let plan = self.plan(desired, prior).await?;
        let last_applied_hash = prior.map(|p| p.config_hash.clone());
        let config_changed = last_applied_hash
            .as_deref()
            .is_none_or(|hash| hash != desired.config_hash);

        Ok(DriftReport {
            config_changed,
            last_applied_hash,
            plan,
        })
    }

    /// Observed entries of a collection in remote order.
    async fn observe(&self, kind: SubResourceKind, scope: &ParentScope) -> Result<Vec<SubResourceEntry>> {
        let mut entries = self.api.list(kind, scope).await?;
        entries.sort_by_key(|entry| entry.index);
        Ok(entries)
    }

    /// Best-effort child teardown followed by the parent deletion, per scope.
    async fn teardown(&self, scopes: &[ParentScope], summary: &mut PlanSummary) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();

        for scope in scopes {
            if self
                .api
                .get_parent(scope.parent_type, &scope.parent_name)
                .await?
                .is_none()
            {
                debug!("{scope} already absent");
                continue;
            }

            for &kind in SubResourceKind::kinds_for(scope.parent_type) {
                let observed = match self.observe(kind, scope).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("Cannot list {kind} entries of {scope}, skipping: {e}");
                        continue;
                    }
                };
                let plan = self.reconciler.reconcile::<SubResourceEntry>(&[], &observed);
                summary.absorb(&plan.summary);
                if !plan.is_empty() {
                    batches.push(Batch::Collection {
                        scope: scope.clone(),
                        kind,
                        plan,
                        best_effort: true,
                    });
                }
            }

            batches.push(Batch::Parent {
                operation: ParentOperation::Delete {
                    parent_type: scope.parent_type,
                    name: scope.parent_name.clone(),
                },
            });
        }

        Ok(batches)
    }

    async fn execute(&self, batches: &[Batch]) -> Result<ExecutionReport> {
        TransactionCoordinator::new(self.api, self.api)
            .execute(batches)
            .await
    }
}

/// Declared scopes first, then scopes only the prior state knows.
fn known_scopes(desired: &DesiredStack, prior: Option<&StackState>) -> Vec<ParentScope> {
    let mut scopes = desired.scopes();
    for scope in prior.map(StackState::scopes).unwrap_or_default() {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes
}

/// Frontends go first so nothing still routes to a backend being removed.
fn sort_for_teardown(scopes: &mut [ParentScope]) {
    scopes.sort_by_key(|scope| scope.parent_type != ParentType::Frontend);
}
