//! The move subsystem: validity, cycle detection, and the
//! unapply/reapply replay that keeps convergence under out-of-order
//! delivery. This is the part of the design with no real precedent in an
//! Automerge-style CRDT — it is grounded on Kleppmann's tree-move paper
//! as implemented by `crdt_tree::state::State`'s `do_op`/`undo_op`/
//! `redo_op` triangle, adapted here to operate on op ids rather than
//! tree nodes directly.

use crate::document_tree::DocumentTree;
use crate::lifecycle::LifecycleList;
use crate::types::{Key, ObjId, OpId, Operation, OpType};
use std::collections::HashMap;

/// A record of one applied MOVE, enough to revert and later replay it
/// during bulk revalidation.
#[derive(Debug, Clone)]
pub(crate) struct LogEntry {
    pub op_id: OpId,
    pub moved_id: OpId,
    pub new_parent: ObjId,
    pub new_prop: Key,
    pub valid: bool,
    /// The subset of `op.pred` that actually received a trash event when
    /// this op was applied (excludes the self-move and already-invalid
    /// exceptions below).
    pub trashed_preds: Vec<OpId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MoveManager {
    document_tree: DocumentTree,
    lifecycles: HashMap<OpId, LifecycleList>,
    op_log: Vec<LogEntry>,
    valid: HashMap<OpId, bool>,
    move_id_map: HashMap<OpId, OpId>,
    winners: HashMap<OpId, Vec<OpId>>,
    move_parents: HashMap<OpId, Vec<(Option<ObjId>, Option<Key>)>>,
}

impl MoveManager {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_valid(&self, id: OpId) -> bool {
        *self.valid.get(&id).unwrap_or(&true)
    }

    /// Trash status of `subject` as of `at`, in the total order given by
    /// `cmp_id` — not whatever the lifecycle log currently holds at its
    /// tail. A cycle check run mid-replay (bulk revalidation unwinds and
    /// replays log entries out of their final order) must see history as
    /// it stood at the querying op's own position.
    pub fn is_trashed_at(&self, subject: OpId, at: OpId, cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering) -> bool {
        self.lifecycles
            .get(&subject)
            .map(|lc| lc.is_trashed_at(at, |id| self.is_valid(id), cmp_id))
            .unwrap_or(false)
    }

    pub fn current_parent(&self, subject: OpId) -> Option<(ObjId, Key)> {
        let parent = self.document_tree.parent_of(subject)?;
        let prop = self.document_tree.prop_of(subject)?.clone();
        Some((parent, prop))
    }

    fn lifecycle_of(&mut self, subject: OpId) -> &mut LifecycleList {
        self.lifecycles
            .entry(subject)
            .or_insert_with(|| LifecycleList::new(subject))
    }

    /// Applies a brand-new operation for the first time: registers a
    /// fresh subject (MAKE/PUT), runs the move-specific bookkeeping for a
    /// MOVE, and trashes whichever predecessors it overwrites.
    /// Returns the [`LogEntry`] if this was a MOVE (and should be pushed
    /// onto `op_log`), otherwise `None`.
    pub fn apply(&mut self, op: &Operation, cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering) -> Option<LogEntry> {
        if matches!(op.action, OpType::Make(_) | OpType::Put(_)) {
            self.lifecycle_of(op.id);
            self.document_tree.register(op.id, op.obj, op.key.clone());
        }

        let moved_id = match &op.action {
            OpType::Move { moved_id, .. } => Some(*moved_id),
            _ => None,
        };

        // `p` is whatever op currently occupies the overwritten slot. If
        // that occupant arrived via a MOVE, `p` is the MOVE's own op id,
        // not the subject it carries — resolve through `move_id_map` so
        // both the self-move test and the trashed subject are correct
        // for a chained move.
        let mut trashed_preds = Vec::new();
        for &p in &op.pred {
            let resolved = self.move_id_map.get(&p).copied().unwrap_or(p);
            let is_self_move = moved_id == Some(resolved);
            if !is_self_move && self.is_valid(resolved) {
                self.lifecycle_of(resolved).push_trash(op.id);
                trashed_preds.push(resolved);
            }
        }

        let moved_id = moved_id?;
        self.move_id_map.insert(op.id, moved_id);
        let valid = self.install_move(op.id, moved_id, op.obj, op.key.clone(), cmp_id);
        Some(LogEntry {
            op_id: op.id,
            moved_id,
            new_parent: op.obj,
            new_prop: op.key.clone(),
            valid,
            trashed_preds,
        })
    }

    /// Re-derives and re-installs a previously reverted MOVE log entry at
    /// its original place in the total order. The cycle check is redone
    /// from scratch: intervening new operations may have changed the
    /// tree since this entry last held the field.
    pub fn reapply(&mut self, entry: &LogEntry, cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering) -> LogEntry {
        self.move_id_map.insert(entry.op_id, entry.moved_id);
        let valid = self.install_move(entry.op_id, entry.moved_id, entry.new_parent, entry.new_prop.clone(), cmp_id);
        for &p in &entry.trashed_preds {
            self.lifecycle_of(p).push_trash(entry.op_id);
        }
        LogEntry {
            op_id: entry.op_id,
            moved_id: entry.moved_id,
            new_parent: entry.new_parent,
            new_prop: entry.new_prop.clone(),
            valid,
            trashed_preds: entry.trashed_preds.clone(),
        }
    }

    /// Cycle check plus winner-stack/tree bookkeeping shared by `apply`
    /// and `reapply`. Returns whether the move won.
    fn install_move(
        &mut self,
        op_id: OpId,
        moved_id: OpId,
        new_parent: ObjId,
        new_prop: Key,
        cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering,
    ) -> bool {
        let cycle = self
            .document_tree
            .is_ancestor(moved_id, new_parent, |s| self.is_trashed_at(s, op_id, cmp_id));
        let valid = !cycle;
        self.valid.insert(op_id, valid);
        if valid {
            let old = self.document_tree.set_parent(moved_id, new_parent, new_prop);
            self.move_parents.entry(moved_id).or_default().push(old);
            let winners = self.winners.entry(moved_id).or_default();
            if let Some(&prev) = winners.last() {
                self.valid.insert(prev, false);
            }
            winners.push(op_id);
            self.lifecycle_of(moved_id).push_present(op_id);
        }
        valid
    }

    /// Undoes everything `apply`/`reapply` did for this entry, without
    /// removing it from `op_log` (the caller owns that stack).
    pub fn revert(&mut self, entry: &LogEntry) {
        if entry.valid {
            if let Some(stack) = self.winners.get_mut(&entry.moved_id) {
                stack.pop();
                if let Some(&top) = stack.last() {
                    self.valid.insert(top, true);
                }
            }
            if let Some(pstack) = self.move_parents.get_mut(&entry.moved_id) {
                if let Some((old_parent, old_prop)) = pstack.pop() {
                    self.document_tree.restore_parent(entry.moved_id, old_parent, old_prop);
                }
            }
            if let Some(lc) = self.lifecycles.get_mut(&entry.moved_id) {
                lc.pop_if(entry.op_id);
            }
        }
        for p in &entry.trashed_preds {
            if let Some(lc) = self.lifecycles.get_mut(p) {
                lc.pop_if(entry.op_id);
            }
        }
        self.valid.remove(&entry.op_id);
        self.move_id_map.remove(&entry.op_id);
    }

    /// Incremental update for a single freshly-inserted op (local, or one
    /// remote op applied outside of bulk change processing): unwinds any
    /// log entries with a greater op_id, applies the new op, then
    /// replays the unwound entries back in original order. `cmp_id` must
    /// be the replica's cross-actor total order
    /// ([`crate::indexed_cache::ActorIndex::cmp_opid`]), not `OpId`'s own
    /// field-order `Ord` — two replicas only agree on the former.
    pub fn incremental_update(&mut self, op: &Operation, cmp_id: impl Fn(OpId, OpId) -> std::cmp::Ordering) {
        let split = self
            .op_log
            .partition_point(|e| cmp_id(e.op_id, op.id) == std::cmp::Ordering::Less);
        let stashed: Vec<LogEntry> = self.op_log.split_off(split);
        for e in stashed.iter().rev() {
            self.revert(e);
        }

        if let Some(entry) = self.apply(op, &cmp_id) {
            self.op_log.push(entry);
        }

        for e in &stashed {
            let replayed = self.reapply(e, &cmp_id);
            self.op_log.push(replayed);
        }
    }

    /// Bulk revalidation for a batch of new operations belonging to one
    /// change : unwinds whichever of `op_log`'s tail or the new
    /// ops' tail has the larger id, repeatedly, then replays everything
    /// smallest-to-largest. See [`Self::incremental_update`] on `cmp_id`.
    pub fn bulk_revalidate(&mut self, mut new_ops: Vec<Operation>, cmp_id: impl Fn(OpId, OpId) -> std::cmp::Ordering) {
        new_ops.sort_by(|a, b| cmp_id(a.id, b.id));

        enum Pending {
            Old(LogEntry),
            New(Operation),
        }
        let mut stack = Vec::new();

        loop {
            let log_top = self.op_log.last().map(|e| e.op_id);
            let new_top = new_ops.last().map(|o| o.id);
            match (log_top, new_top) {
                (None, None) => break,
                (Some(_), None) => {
                    let e = self.op_log.pop().unwrap();
                    self.revert(&e);
                    stack.push(Pending::Old(e));
                }
                (None, Some(_)) => {
                    stack.push(Pending::New(new_ops.pop().unwrap()));
                }
                (Some(l), Some(n)) => {
                    if cmp_id(l, n) != std::cmp::Ordering::Less {
                        let e = self.op_log.pop().unwrap();
                        self.revert(&e);
                        stack.push(Pending::Old(e));
                    } else {
                        stack.push(Pending::New(new_ops.pop().unwrap()));
                    }
                }
            }
        }

        for item in stack.into_iter().rev() {
            match item {
                Pending::Old(e) => {
                    let replayed = self.reapply(&e, &cmp_id);
                    self.op_log.push(replayed);
                }
                Pending::New(op) => {
                    if let Some(entry) = self.apply(&op, &cmp_id) {
                        self.op_log.push(entry);
                    }
                }
            }
        }
    }
}
