//! Abstract memory port
//!
//! The engine is generic over the abstract domain. A [`Snapshot`] is one
//! abstract memory state; the engine only ever touches it through this
//! trait, inside a transaction driven by
//! [`FlowSet`](crate::features::memory::domain::FlowSet).

/// One abstract memory state of the analyzed program
///
/// All mutation happens between `start_transaction` and one of the commit
/// methods. `extend*` and `merge_with_call_level` are join operations and
/// are only called inside an open transaction. Snapshots own their state
/// and may not borrow from the analyzed program.
pub trait Snapshot: 'static {
    /// Abstract value of the domain, used for argument and receiver passing
    /// across call boundaries
    type Value: Clone;

    /// Open a transaction on this snapshot
    fn start_transaction(&mut self);

    /// Close the transaction; returns whether the visible state changed
    /// compared to the state before the transaction
    fn commit_transaction(&mut self) -> bool;

    /// Close the transaction, widening against the pre-transaction state
    /// first; returns whether the visible state changed
    fn widen_and_commit_transaction(&mut self) -> bool;

    /// Replace this snapshot's content with the join of `sources`
    fn extend(&mut self, sources: &[&Self]);

    /// Initialize this snapshot as the entry state of a called function:
    /// carry over what survives the call boundary from `caller` and bind
    /// `arguments` and the optional receiver
    fn extend_as_call(
        &mut self,
        caller: &Self,
        called_object: Option<&Self::Value>,
        arguments: &[Self::Value],
    );

    /// Merge the exit states of call branches back into the caller's flow:
    /// `self` becomes `caller` updated with the effects visible in
    /// `branch_outputs`
    fn merge_with_call_level(&mut self, caller: &Self, branch_outputs: &[&Self]);
}
