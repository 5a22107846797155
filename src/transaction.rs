//! Transactional execution of operation batches.
//!
//! Every lifecycle call runs its remote mutations inside exactly one Data
//! Plane transaction. Batches execute in order; the first failing operation
//! stops execution, rolls the transaction back once and propagates with its
//! context. Nothing is committed unless every batch succeeded.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dataplane::{CollectionAdapter, ParentAdapter, TransactionApi, TransactionHandle};
use crate::error::{LbStackError, ReconcileError, Result, TransactionError};
use crate::model::{ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind};
use crate::planner::{OperationPlan, PlannedOperation};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Accepting operations.
    Open,
    /// Committed. Terminal.
    Committed,
    /// Rolled back. Terminal.
    RolledBack,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{text}")
    }
}

/// A transaction owned by one in-flight lifecycle call.
#[derive(Debug)]
pub struct Transaction {
    handle: TransactionHandle,
    state: TransactionState,
}

impl Transaction {
    /// Remote handle.
    #[must_use]
    pub const fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    fn ensure_open(&self, attempted: &'static str) -> Result<()> {
        if self.state == TransactionState::Open {
            return Ok(());
        }
        error!(
            "Refusing to {attempted} transaction {}: already {}",
            self.handle.id, self.state
        );
        Err(TransactionError::InvalidState {
            id: self.handle.id.clone(),
            attempted,
            state: self.state.to_string(),
        }
        .into())
    }
}

/// A change to a parent section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ParentOperation {
    /// Create the parent.
    Create {
        /// Desired parent.
        resource: ParentResource,
    },
    /// Replace the parent's settings.
    Update {
        /// Desired parent.
        resource: ParentResource,
        /// Fields that differ remotely.
        changed: Vec<String>,
    },
    /// Delete the parent.
    Delete {
        /// Parent type.
        parent_type: ParentType,
        /// Parent name.
        name: String,
    },
}

impl ParentOperation {
    /// Scope of the parent.
    #[must_use]
    pub fn scope(&self) -> ParentScope {
        match self {
            Self::Create { resource } | Self::Update { resource, .. } => resource.scope(),
            Self::Delete { parent_type, name } => ParentScope::new(*parent_type, name.clone()),
        }
    }

    /// Verb used in logs and CLI output.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Describes the operation.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Update { changed, .. } if !changed.is_empty() => {
                format!("update {} ({})", self.scope(), changed.join(", "))
            }
            _ => format!("{} {}", self.verb(), self.scope()),
        }
    }
}

/// An ordered group of operations sharing one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "batch", rename_all = "snake_case")]
pub enum Batch {
    /// A single parent change.
    Parent {
        /// The change.
        operation: ParentOperation,
    },
    /// The plan for one sub-collection.
    Collection {
        /// Owning parent.
        scope: ParentScope,
        /// Collection kind.
        kind: SubResourceKind,
        /// Operations in execution order.
        plan: OperationPlan<SubResourceEntry>,
        /// Failures are logged and skipped instead of aborting.
        best_effort: bool,
    },
}

impl Batch {
    /// Number of remote operations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Parent { .. } => 1,
            Self::Collection { plan, .. } => plan.len(),
        }
    }

    /// Returns true if the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scope the batch targets.
    #[must_use]
    pub fn scope(&self) -> ParentScope {
        match self {
            Self::Parent { operation } => operation.scope(),
            Self::Collection { scope, .. } => scope.clone(),
        }
    }
}

/// Outcome of executing a set of batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Transaction used, if one was opened.
    pub transaction_id: Option<String>,
    /// Operations applied.
    pub applied: usize,
    /// Best-effort operations that failed and were skipped.
    pub skipped: usize,
}

/// Runs batches of operations inside one remote transaction.
pub struct TransactionCoordinator<'a, T: ?Sized, A: ?Sized> {
    transactions: &'a T,
    adapter: &'a A,
}

impl<'a, T, A> TransactionCoordinator<'a, T, A>
where
    T: TransactionApi + ?Sized,
    A: ParentAdapter + CollectionAdapter + ?Sized,
{
    /// Creates a coordinator over a transaction API and an adapter.
    #[must_use]
    pub const fn new(transactions: &'a T, adapter: &'a A) -> Self {
        Self {
            transactions,
            adapter,
        }
    }

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails.
    pub async fn begin(&self) -> Result<Transaction> {
        let handle = self.transactions.begin().await?;
        info!("Opened transaction {handle}");
        Ok(Transaction {
            handle,
            state: TransactionState::Open,
        })
    }

    /// Commits an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidState`] without contacting the
    /// remote side if the transaction is not open, or the remote error.
    pub async fn commit(&self, txn: &mut Transaction) -> Result<()> {
        txn.ensure_open("commit")?;
        self.transactions.commit(&txn.handle).await?;
        txn.state = TransactionState::Committed;
        info!("Committed transaction {}", txn.handle.id);
        Ok(())
    }

    /// Rolls back an open transaction.
    ///
    /// The transaction is terminal afterwards even if the remote call fails.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::InvalidState`] without contacting the
    /// remote side if the transaction is not open, or the remote error.
    pub async fn rollback(&self, txn: &mut Transaction) -> Result<()> {
        txn.ensure_open("roll back")?;
        txn.state = TransactionState::RolledBack;
        self.transactions.rollback(&txn.handle).await?;
        info!("Rolled back transaction {}", txn.handle.id);
        Ok(())
    }

    /// Applies one batch within an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::OperationFailed`] for the first failing
    /// operation of a batch that is not best-effort. Later operations are not
    /// attempted.
    pub async fn apply(
        &self,
        txn: &Transaction,
        batch: &Batch,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        txn.ensure_open("apply operations to")?;

        match batch {
            Batch::Parent { operation } => {
                debug!("{}", operation.describe());
                self.apply_parent(operation, &txn.handle)
                    .await
                    .map_err(|e| {
                        ReconcileError::operation_failed(operation.describe(), &operation.scope(), e)
                    })?;
                report.applied += 1;
            }
            Batch::Collection {
                scope,
                kind,
                plan,
                best_effort,
            } => {
                for op in plan {
                    let description = op.describe(*kind);
                    debug!("{description} in {scope}");
                    match self.apply_entry(*kind, scope, op, &txn.handle).await {
                        Ok(()) => report.applied += 1,
                        Err(e) if *best_effort => {
                            warn!("Ignoring failure to {description} in {scope}: {e}");
                            report.skipped += 1;
                        }
                        Err(e) => {
                            return Err(
                                ReconcileError::operation_failed(description, scope, e).into()
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs every batch in one transaction and commits.
    ///
    /// Opens no transaction when there is nothing to do.
    ///
    /// # Errors
    ///
    /// Returns the first operation failure after rolling back, or the commit
    /// failure after rolling back.
    pub async fn execute(&self, batches: &[Batch]) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if batches.iter().all(Batch::is_empty) {
            debug!("Nothing to apply, no transaction opened");
            return Ok(report);
        }

        let mut txn = self.begin().await?;
        report.transaction_id = Some(txn.handle.id.clone());

        for batch in batches {
            if let Err(err) = self.apply(&txn, batch, &mut report).await {
                error!("{err}");
                self.abort(&mut txn).await;
                return Err(err);
            }
        }

        if let Err(err) = self.commit(&mut txn).await {
            error!("Commit of transaction {} failed: {err}", txn.handle.id);
            self.abort(&mut txn).await;
            return Err(err);
        }

        Ok(report)
    }

    async fn abort(&self, txn: &mut Transaction) {
        if let Err(rollback_err) = self.rollback(txn).await {
            error!(
                "Rollback of transaction {} failed: {rollback_err}",
                txn.handle.id
            );
        }
    }

    async fn apply_parent(&self, operation: &ParentOperation, txn: &TransactionHandle) -> Result<()> {
        match operation {
            ParentOperation::Create { resource } => self.adapter.create_parent(resource, txn).await,
            ParentOperation::Update { resource, .. } => {
                self.adapter.update_parent(resource, txn).await
            }
            ParentOperation::Delete { parent_type, name } => {
                self.adapter.delete_parent(*parent_type, name, txn).await
            }
        }
    }

    async fn apply_entry(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
        op: &PlannedOperation<SubResourceEntry>,
        txn: &TransactionHandle,
    ) -> Result<()> {
        match op {
            PlannedOperation::UpdateInPlace {
                index,
                current_name,
                entry,
                ..
            } => {
                self.adapter
                    .update_at(kind, *index, current_name.as_deref(), scope, entry, txn)
                    .await
            }
            PlannedOperation::Delete { index, name, .. } => {
                self.adapter
                    .delete_at(kind, *index, name.as_deref(), scope, txn)
                    .await
            }
            PlannedOperation::Create { index, entry, .. } => {
                self.adapter.create(kind, scope, *index, entry, txn).await
            }
        }
    }
}

/// Returns true if the error came out of a remote operation.
#[must_use]
pub const fn is_operation_failure(err: &LbStackError) -> bool {
    matches!(err, LbStackError::Reconcile(ReconcileError::OperationFailed { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::memory::MemoryDataplane;
    use crate::error::DataplaneError;
    use crate::planner::CollectionReconciler;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::sync::Mutex;

    mock! {
        Transactions {}

        #[async_trait]
        impl TransactionApi for Transactions {
            async fn begin(&self) -> Result<TransactionHandle>;
            async fn commit(&self, txn: &TransactionHandle) -> Result<()>;
            async fn rollback(&self, txn: &TransactionHandle) -> Result<()>;
        }
    }

    /// Records every mutation and fails the `fail_at`th one.
    #[derive(Default)]
    struct RecordingAdapter {
        calls: Mutex<Vec<String>>,
        fail_at: Option<usize>,
    }

    impl RecordingAdapter {
        fn failing_at(n: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_at: Some(n),
            }
        }

        fn record(&self, call: String) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            if Some(calls.len()) == self.fail_at {
                return Err(DataplaneError::api_error(400, "rejected by proxy").into());
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ParentAdapter for RecordingAdapter {
        async fn get_parent(
            &self,
            _parent_type: ParentType,
            _name: &str,
        ) -> Result<Option<ParentResource>> {
            Ok(None)
        }

        async fn create_parent(&self, parent: &ParentResource, _txn: &TransactionHandle) -> Result<()> {
            self.record(format!("create {}", parent.scope()))
        }

        async fn update_parent(&self, parent: &ParentResource, _txn: &TransactionHandle) -> Result<()> {
            self.record(format!("update {}", parent.scope()))
        }

        async fn delete_parent(
            &self,
            parent_type: ParentType,
            name: &str,
            _txn: &TransactionHandle,
        ) -> Result<()> {
            self.record(format!("delete {parent_type} {name}"))
        }
    }

    #[async_trait]
    impl CollectionAdapter for RecordingAdapter {
        async fn list(
            &self,
            _kind: SubResourceKind,
            _scope: &ParentScope,
        ) -> Result<Vec<SubResourceEntry>> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            kind: SubResourceKind,
            _scope: &ParentScope,
            index: i64,
            _entry: &SubResourceEntry,
            _txn: &TransactionHandle,
        ) -> Result<()> {
            self.record(format!("create {kind} {index}"))
        }

        async fn update_at(
            &self,
            kind: SubResourceKind,
            index: i64,
            _current_name: Option<&str>,
            _scope: &ParentScope,
            _entry: &SubResourceEntry,
            _txn: &TransactionHandle,
        ) -> Result<()> {
            self.record(format!("update {kind} {index}"))
        }

        async fn delete_at(
            &self,
            kind: SubResourceKind,
            index: i64,
            _name: Option<&str>,
            _scope: &ParentScope,
            _txn: &TransactionHandle,
        ) -> Result<()> {
            self.record(format!("delete {kind} {index}"))
        }
    }

    fn handle() -> TransactionHandle {
        TransactionHandle {
            id: String::from("txn-1"),
            version: 1,
        }
    }

    fn rules(count: i64) -> Vec<SubResourceEntry> {
        (0..count)
            .map(|index| {
                SubResourceEntry::from_object(
                    SubResourceKind::HttpRequestRule,
                    json!({"type": "deny", "cond": "if", "cond_test": format!("acl_{index}")}),
                    index,
                )
                .unwrap()
            })
            .collect()
    }

    fn create_batch(count: i64) -> Batch {
        Batch::Collection {
            scope: ParentScope::frontend("web_fe"),
            kind: SubResourceKind::HttpRequestRule,
            plan: CollectionReconciler::new().reconcile(&rules(count), &[]),
            best_effort: false,
        }
    }

    fn teardown_batch(count: i64) -> Batch {
        Batch::Collection {
            scope: ParentScope::frontend("web_fe"),
            kind: SubResourceKind::HttpRequestRule,
            plan: CollectionReconciler::new().reconcile(&[], &rules(count)),
            best_effort: true,
        }
    }

    #[tokio::test]
    async fn test_failure_rolls_back_once_and_stops() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions.expect_commit().never();
        transactions
            .expect_rollback()
            .times(1)
            .returning(|_| Ok(()));
        let adapter = RecordingAdapter::failing_at(3);

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let err = coordinator
            .execute(&[create_batch(5)])
            .await
            .expect_err("third operation fails");

        assert!(is_operation_failure(&err));
        assert!(err.to_string().contains("at index 2"));
        assert!(err.to_string().contains("rejected by proxy"));
        assert_eq!(adapter.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_skips_later_batches() {
        let dataplane = MemoryDataplane::new()
            .with_parent(ParentResource::Frontend(crate::model::Frontend::named("web_fe")))
            .fail_on_mutation(3);
        let coordinator = TransactionCoordinator::new(&dataplane, &dataplane);

        let result = coordinator
            .execute(&[create_batch(5), create_batch(2)])
            .await;

        assert!(result.is_err());
        assert_eq!(dataplane.mutations(), 3);
        assert_eq!(dataplane.commits(), 0);
        assert_eq!(dataplane.rollbacks(), 1);
        assert!(
            dataplane
                .entries(&ParentScope::frontend("web_fe"), SubResourceKind::HttpRequestRule)
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_best_effort_failures_continue() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions
            .expect_commit()
            .times(1)
            .returning(|_| Ok(()));
        transactions.expect_rollback().never();
        let adapter = RecordingAdapter::failing_at(2);

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let report = coordinator
            .execute(&[teardown_batch(3)])
            .await
            .expect("best-effort failures are not fatal");

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.transaction_id.as_deref(), Some("txn-1"));
        assert_eq!(
            adapter.calls(),
            vec![
                String::from("delete http-request rule 2"),
                String::from("delete http-request rule 1"),
                String::from("delete http-request rule 0"),
            ]
        );
    }

    #[tokio::test]
    async fn test_terminal_calls_are_one_shot() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions
            .expect_commit()
            .times(1)
            .returning(|_| Ok(()));
        transactions.expect_rollback().never();
        let adapter = RecordingAdapter::default();

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let mut txn = coordinator.begin().await.expect("begin");
        coordinator.commit(&mut txn).await.expect("first commit");
        assert_eq!(txn.state(), TransactionState::Committed);

        let again = coordinator.commit(&mut txn).await.expect_err("second commit");
        assert!(matches!(
            again,
            LbStackError::Transaction(TransactionError::InvalidState { attempted: "commit", .. })
        ));
        assert!(coordinator.rollback(&mut txn).await.is_err());

        let mut report = ExecutionReport::default();
        assert!(
            coordinator
                .apply(&txn, &create_batch(1), &mut report)
                .await
                .is_err()
        );
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_is_one_shot_even_when_it_fails() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions
            .expect_rollback()
            .times(1)
            .returning(|_| Err(DataplaneError::network("connection reset").into()));
        transactions.expect_commit().never();
        let adapter = RecordingAdapter::default();

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let mut txn = coordinator.begin().await.expect("begin");
        assert!(coordinator.rollback(&mut txn).await.is_err());
        assert_eq!(txn.state(), TransactionState::RolledBack);
        assert!(coordinator.rollback(&mut txn).await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions
            .expect_rollback()
            .times(1)
            .returning(|_| Err(DataplaneError::network("connection reset").into()));
        transactions.expect_commit().never();
        let adapter = RecordingAdapter::failing_at(1);

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let err = coordinator
            .execute(&[create_batch(2)])
            .await
            .expect_err("first operation fails");

        assert!(is_operation_failure(&err));
        assert_eq!(adapter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let mut transactions = MockTransactions::new();
        transactions
            .expect_begin()
            .times(1)
            .returning(|| Ok(handle()));
        transactions.expect_commit().times(1).returning(|_| {
            Err(DataplaneError::Conflict {
                message: String::from("version mismatch"),
            }
            .into())
        });
        transactions
            .expect_rollback()
            .times(1)
            .returning(|_| Ok(()));
        let adapter = RecordingAdapter::default();

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let err = coordinator
            .execute(&[create_batch(1)])
            .await
            .expect_err("commit fails");
        assert!(matches!(
            err,
            LbStackError::Dataplane(DataplaneError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_nothing_to_do_opens_no_transaction() {
        let mut transactions = MockTransactions::new();
        transactions.expect_begin().never();
        let adapter = RecordingAdapter::default();

        let coordinator = TransactionCoordinator::new(&transactions, &adapter);
        let report = coordinator
            .execute(&[create_batch(0)])
            .await
            .expect("empty plan");
        assert_eq!(report, ExecutionReport::default());
    }

    #[tokio::test]
    async fn test_parent_then_children_commit_together() {
        let dataplane = MemoryDataplane::new();
        let coordinator = TransactionCoordinator::new(&dataplane, &dataplane);
        let frontend = ParentResource::Frontend(crate::model::Frontend::named("web_fe"));

        let report = coordinator
            .execute(&[
                Batch::Parent {
                    operation: ParentOperation::Create {
                        resource: frontend,
                    },
                },
                create_batch(3),
            ])
            .await
            .expect("execute");

        assert_eq!(report.applied, 4);
        assert_eq!(dataplane.commits(), 1);
        let committed =
            dataplane.entries(&ParentScope::frontend("web_fe"), SubResourceKind::HttpRequestRule);
        assert_eq!(committed, rules(3));
    }
}
