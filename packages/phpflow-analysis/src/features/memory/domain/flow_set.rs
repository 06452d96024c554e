//! Transactional wrapper around a snapshot
//!
//! A [`FlowSet`] pairs a snapshot with the bookkeeping the fixpoint needs:
//! the transaction lifecycle, a commit counter that drives widening, and
//! the change flag consumed by the scheduler.

use tracing::trace;

use crate::features::memory::ports::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    NotStarted,
    Active,
    Committed,
}

/// A snapshot plus its transaction and widening bookkeeping
#[derive(Debug, Clone)]
pub struct FlowSet<S: Snapshot> {
    snapshot: S,
    state: TransactionState,
    has_changes: bool,
    commit_count: u32,
    widening_limit: u32,
    frozen: bool,
}

impl<S: Snapshot> FlowSet<S> {
    /// Wrap a fresh snapshot
    pub fn new(snapshot: S, widening_limit: u32) -> Self {
        Self {
            snapshot,
            state: TransactionState::NotStarted,
            // Reported as changed until the first commit so that a node's
            // children are scheduled at least once.
            has_changes: true,
            commit_count: 0,
            widening_limit,
            frozen: false,
        }
    }

    /// Open a transaction
    ///
    /// Panics when the set is frozen or a transaction is already open.
    pub fn start_transaction(&mut self) {
        assert!(!self.frozen, "transaction started on a frozen flow set");
        assert!(
            self.state != TransactionState::Active,
            "transaction started while another is active"
        );
        self.snapshot.start_transaction();
        self.state = TransactionState::Active;
    }

    /// Commit the open transaction, widening first once the commit counter
    /// exceeds the widening limit
    ///
    /// Panics when no transaction is active.
    pub fn commit_transaction(&mut self) {
        assert!(
            self.state == TransactionState::Active,
            "commit without an active transaction"
        );
        self.commit_count += 1;
        let snapshot_changed = if self.commit_count > self.widening_limit {
            trace!(commit = self.commit_count, "widening commit");
            self.snapshot.widen_and_commit_transaction()
        } else {
            self.snapshot.commit_transaction()
        };
        // The very first commit always counts as a change.
        self.has_changes = snapshot_changed || self.commit_count == 1;
        self.state = TransactionState::Committed;
    }

    /// Whether the last commit changed the visible state
    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Whether this set has been committed at least once
    pub fn is_committed(&self) -> bool {
        self.state == TransactionState::Committed
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Number of commits so far
    pub fn commit_count(&self) -> u32 {
        self.commit_count
    }

    /// Restart the widening counter, used when a later phase reuses the
    /// sets of a finished one
    pub fn reset_commit_count(&mut self) {
        self.commit_count = 0;
    }

    /// Forbid any further transactions
    pub fn freeze(&mut self) {
        assert!(
            self.state != TransactionState::Active,
            "freeze with an open transaction"
        );
        self.frozen = true;
    }

    /// Whether the set accepts no further transactions
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Read access to the wrapped snapshot
    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Write access to the wrapped snapshot, only valid inside a transaction
    pub fn snapshot_mut(&mut self) -> &mut S {
        assert!(
            self.state == TransactionState::Active,
            "snapshot mutated outside a transaction"
        );
        &mut self.snapshot
    }
}
