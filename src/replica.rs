//! The externally-facing replica handle: owns the op set, the
//! change history, the dependency frontier, and the causal-ready queue.
//! Mirrors `Automerge`'s own document handle, generalized to carry a
//! per-replica [`MovePolicy`] instead of a process-wide flag.

use crate::change::{Change, DecodeChangeError};
use crate::error::Result;
use crate::op_set::{MovePolicy, OpSet};
use crate::transaction::Transaction;
use crate::types::{ActorId, ChangeHash};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, trace};

/// A collaborative replica: a tree of nested maps and lists, plus enough
/// bookkeeping to exchange and causally order changes with other
/// replicas.
#[derive(Debug, Clone)]
pub struct Replica {
    pub(crate) op_set: OpSet,
    pub(crate) frontier: Vec<ChangeHash>,
    history: Vec<Change>,
    known_hashes: HashSet<ChangeHash>,
    seqs: HashMap<ActorId, u64>,
    queue: Vec<Change>,
}

impl Replica {
    /// A fresh, empty replica with a random actor id and the move
    /// subsystem enabled.
    pub fn new() -> Self {
        Self::new_with_move_policy(ActorId::random(), MovePolicy::Enabled)
    }

    pub fn new_with_move_policy(actor: ActorId, move_policy: MovePolicy) -> Self {
        Replica {
            op_set: OpSet::new(actor, move_policy),
            frontier: Vec::new(),
            history: Vec::new(),
            known_hashes: HashSet::new(),
            seqs: HashMap::new(),
            queue: Vec::new(),
        }
    }

    /// Builder-style actor override, mirroring `Automerge::with_actor`.
    /// Only meaningful on a replica with no history yet.
    pub fn with_actor(self, actor: ActorId) -> Self {
        Replica::new_with_move_policy(actor, self.op_set.move_policy())
    }

    pub fn actor_id(&self) -> &ActorId {
        self.op_set.actors.self_actor_id()
    }

    pub fn move_policy(&self) -> MovePolicy {
        self.op_set.move_policy()
    }

    pub fn frontier(&self) -> &[ChangeHash] {
        &self.frontier
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        let actor = self.actor_id().clone();
        let entry = self.seqs.entry(actor).or_insert(0);
        *entry += 1;
        *entry
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start_transaction(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Finalizes a locally-produced change: the ops are already present
    /// in the op set (inserted incrementally as the transaction ran), so
    /// this only updates history/frontier/seq bookkeeping.
    #[instrument(level = "debug", skip(self, change), fields(hash = %change.hash, ops = change.ops.len()))]
    pub(crate) fn append_local_change(&mut self, change: Change) -> ChangeHash {
        let hash = change.hash;
        self.frontier.retain(|h| !change.deps.contains(h));
        self.frontier.push(hash);
        self.known_hashes.insert(hash);
        self.seqs.insert(change.actor.clone(), change.seq);
        debug!(%hash, op_count = change.ops.len(), "committed local change");
        self.history.push(change);
        hash
    }

    fn is_ready(&self, change: &Change) -> bool {
        change.deps.iter().all(|d| self.known_hashes.contains(d))
    }

    fn already_seen(&self, change: &Change) -> bool {
        self.known_hashes.contains(&change.hash)
            || self.seqs.get(&change.actor).map_or(false, |&s| s >= change.seq)
    }

    fn absorb_ready_change(&mut self, change: Change) {
        self.frontier.retain(|h| !change.deps.contains(h));
        self.frontier.push(change.hash);
        self.known_hashes.insert(change.hash);
        self.seqs.insert(change.actor.clone(), change.seq);
        self.op_set.insert_change_ops(change.ops.clone());
        self.history.push(change);
    }

    /// Ingests a batch of externally-encoded changes. A
    /// change whose dependencies aren't all known yet is queued; the
    /// queue is rescanned to a fixed point after every newly-ready change.
    #[instrument(level = "debug", skip(self, encoded))]
    pub fn apply_changes<I>(&mut self, encoded: I) -> std::result::Result<(), DecodeChangeError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        for bytes in encoded {
            let change = Change::decode(&bytes, &mut self.op_set.actors)?;
            self.queue.push(change);
        }
        loop {
            let ready_idx = self.queue.iter().position(|c| self.is_ready(c));
            let Some(idx) = ready_idx else { break };
            let change = self.queue.remove(idx);
            if self.already_seen(&change) {
                trace!(hash = %change.hash, "skipping already-applied change");
                continue;
            }
            trace!(hash = %change.hash, "applying causally-ready change");
            self.absorb_ready_change(change);
        }
        Ok(())
    }

    /// Encodes the full local history for exchange with another replica.
    pub fn history_bytes(&self) -> Vec<Vec<u8>> {
        self.history.iter().map(|c| c.encode(&self.op_set.actors)).collect()
    }

    /// Ingests `other`'s complete history.
    pub fn merge(&mut self, other: &Replica) -> std::result::Result<(), DecodeChangeError> {
        self.apply_changes(other.history_bytes())
    }

    /// Creates a new replica with a fresh actor id and the same
    /// convergent state.
    pub fn fork(&self) -> Self {
        let mut forked = Replica::new_with_move_policy(ActorId::random(), self.move_policy());
        forked
            .apply_changes(self.history_bytes())
            .expect("forking from a consistent replica's own history always decodes");
        forked
    }
}

impl Default for Replica {
    fn default() -> Self {
        Replica::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_read_roundtrips() {
        let mut r = Replica::new();
        let root = crate::exid::ExId::Root;
        let mut txn = r.start_transaction();
        txn.put(&root, "x", 1i64).unwrap();
        txn.commit().unwrap();
        let txn = r.start_transaction();
        assert_eq!(txn.get(&root, "x").unwrap(), crate::op_set::Datum::Scalar(crate::value::ScalarValue::Int(1)));
    }

    #[test_log::test]
    fn merge_converges_two_replicas() {
        let mut a = Replica::new();
        let mut b = Replica::new();
        let root = crate::exid::ExId::Root;

        let mut txn = a.start_transaction();
        txn.put(&root, "x", 1i64).unwrap();
        txn.commit().unwrap();

        a.merge(&b).unwrap();
        b.merge(&a).unwrap();

        let ta = a.start_transaction();
        let tb = b.start_transaction();
        assert_eq!(ta.get(&root, "x").unwrap(), tb.get(&root, "x").unwrap());
    }

    #[test]
    fn empty_transaction_commits_nothing() {
        let mut r = Replica::new();
        let txn = r.start_transaction();
        assert!(txn.commit().is_none());
    }
}
