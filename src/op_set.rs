//! The per-replica collection of object op-trees plus the move manager.
//! This is where the visibility predicate is actually evaluated and
//! where reads/writes are dispatched to the right per-object tree.

use crate::clock::Clock;
use crate::error::{ReplicaError, Result};
use crate::exid::ExId;
use crate::indexed_cache::ActorIndex;
use crate::move_manager::MoveManager;
use crate::op_tree::OpTree;
use crate::types::{ActorId, ElemId, Key, ObjId, ObjType, OpId, OpType, Operation, ResolvedValue};
use crate::value::ScalarValue;
use fxhash::FxBuildHasher;
use std::collections::HashMap;
use tracing::instrument;

/// Whether the move subsystem participates in visibility.
/// Disabling it reproduces plain Automerge-style map/list semantics —
/// used for benchmarking or for documents that never issue a MOVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePolicy {
    Enabled,
    Disabled,
}

impl Default for MovePolicy {
    fn default() -> Self {
        MovePolicy::Enabled
    }
}

/// A fully resolved read result: either a scalar, or a handle on a
/// nested object.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Scalar(ScalarValue),
    Object(ExId, ObjType),
}

#[derive(Debug, Clone)]
pub(crate) struct OpSet {
    pub(crate) actors: ActorIndex,
    trees: HashMap<ObjId, OpTree, FxBuildHasher>,
    move_mgr: MoveManager,
    move_policy: MovePolicy,
    all_ops: HashMap<OpId, Operation>,
    max_op: u64,
    clock: Clock,
}

impl OpSet {
    pub fn new(self_actor: ActorId, move_policy: MovePolicy) -> Self {
        let mut trees: HashMap<ObjId, OpTree, FxBuildHasher> = Default::default();
        trees.insert(ObjId::Root, OpTree::new_map());
        OpSet {
            actors: ActorIndex::new(self_actor),
            trees,
            move_mgr: MoveManager::new(),
            move_policy,
            all_ops: HashMap::new(),
            max_op: 0,
            clock: Clock::new(),
        }
    }

    fn policy(&self) -> MovePolicy {
        self.move_policy
    }

    pub fn move_policy(&self) -> MovePolicy {
        self.move_policy
    }

    pub fn max_op(&self) -> u64 {
        self.max_op
    }

    pub fn bump_max_op(&mut self, counter: u64) {
        self.max_op = self.max_op.max(counter);
    }

    pub fn next_counter(&self) -> u64 {
        self.max_op + 1
    }

    pub fn cmp_id(&self, a: OpId, b: OpId) -> std::cmp::Ordering {
        self.actors.cmp_opid(a, b)
    }

    /// The visibility predicate, parameterized on the replica's
    /// [`MovePolicy`]. A MOVE never lives in its source object's tree (it
    /// is inserted at its *destination*), so the ordinary succ-chain
    /// overwrite check can't by itself hide a MAKE/PUT once it's been
    /// moved away. Instead, for anything the move manager tracks a
    /// subject for, visibility additionally requires that `(op.obj,
    /// op.key)` still matches the subject's current registered location
    /// — which is exactly "this op is the current occupant here" for a
    /// MAKE/PUT, and "this MOVE is the most recent valid mover" for a
    /// MOVE (a superseded mover's own target no longer matches).
    fn is_visible(&self, op: &Operation) -> bool {
        if op.action.is_delete() {
            return false;
        }
        match self.policy() {
            MovePolicy::Disabled => op.succ.is_empty(),
            MovePolicy::Enabled => {
                if !self.move_mgr.is_valid(op.id) {
                    return false;
                }
                if op.succ.iter().any(|s| self.move_mgr.is_valid(*s)) {
                    return false;
                }
                let subject = match &op.action {
                    OpType::Make(_) | OpType::Put(_) => Some(op.id),
                    OpType::Move { moved_id, .. } => Some(*moved_id),
                    OpType::Delete => None,
                };
                match subject.and_then(|s| self.move_mgr.current_parent(s)) {
                    Some((cur_obj, cur_key)) => cur_obj == op.obj && cur_key == op.key,
                    None => true,
                }
            }
        }
    }

    fn tree(&self, obj: ObjId) -> Result<&OpTree> {
        self.trees
            .get(&obj)
            .ok_or_else(|| ReplicaError::invariant(format!("unknown object {obj}")))
    }

    fn tree_mut(&mut self, obj: ObjId) -> Result<&mut OpTree> {
        self.trees
            .get_mut(&obj)
            .ok_or_else(|| ReplicaError::invariant(format!("unknown object {obj}")))
    }

    pub fn object_type(&self, obj: ObjId) -> Option<ObjType> {
        match obj {
            ObjId::Root => Some(ObjType::Map),
            ObjId::Id(id) => match self.all_ops.get(&id)?.action {
                OpType::Make(t) => Some(t),
                _ => None,
            },
        }
    }

    fn resolve(&self, value: ResolvedValue) -> Datum {
        match value {
            ResolvedValue::Scalar(v) => Datum::Scalar(v),
            ResolvedValue::Object(id, t) => Datum::Object(self.export_id(id), t),
            ResolvedValue::Moved(creating_id) => match self.all_ops.get(&creating_id) {
                Some(op) => self.resolve(op.resolved_value()),
                None => Datum::Scalar(ScalarValue::Null),
            },
        }
    }

    pub fn export_id(&self, obj: ObjId) -> ExId {
        match obj {
            ObjId::Root => ExId::Root,
            ObjId::Id(id) => ExId::Id(id.counter, self.actors.actor_id(id.actor).clone()),
        }
    }

    // ---- map reads/writes ----

    #[instrument(level = "trace", skip(self))]
    pub fn map_get(&self, obj: ObjId, prop: &str) -> Result<Datum> {
        let tree = self.tree(obj)?.as_map().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a map"))
        })?;
        let op = tree
            .get(prop, |o| self.is_visible(o))
            .ok_or_else(|| ReplicaError::PropertyNotFound(prop.to_owned()))?;
        Ok(self.resolve(op.resolved_value()))
    }

    fn map_preds(&self, obj: ObjId, prop: &str) -> Result<Vec<OpId>> {
        let tree = self.tree(obj)?.as_map().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a map"))
        })?;
        Ok(tree.visible_ops(prop, |o| self.is_visible(o)).map(|o| o.id).collect())
    }

    pub fn map_pred_for_write(&self, obj: ObjId, prop: &str) -> Result<Vec<OpId>> {
        self.map_preds(obj, prop)
    }

    // ---- list reads/writes ----

    #[instrument(level = "trace", skip(self))]
    pub fn list_get(&self, obj: ObjId, index: usize) -> Result<Datum> {
        let tree = self.tree(obj)?.as_list().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a list"))
        })?;
        let op = tree
            .get(index, |o| self.is_visible(o))
            .ok_or(ReplicaError::ListIndexOutOfRange(index))?;
        Ok(self.resolve(op.resolved_value()))
    }

    pub fn list_len(&self, obj: ObjId) -> Result<usize> {
        let tree = self.tree(obj)?.as_list().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a list"))
        })?;
        Ok(tree.visible_order(|o| self.is_visible(o)).len())
    }

    /// Resolves visible index `index` to its element id and current
    /// preds (for a PUT/DELETE/MOVE overwrite at an *existing* position).
    pub fn list_elem_for_overwrite(&self, obj: ObjId, index: usize) -> Result<(ElemId, Vec<OpId>)> {
        let tree = self.tree(obj)?.as_list().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a list"))
        })?;
        let order = tree.visible_order(|o| self.is_visible(o));
        let elem = *order.get(index).ok_or(ReplicaError::ListIndexOutOfRange(index))?;
        let preds = tree.visible_ops_at(elem, |o| self.is_visible(o)).map(|o| o.id).collect();
        Ok((elem, preds))
    }

    /// Resolves visible index `index` (which may equal the list length,
    /// for append) to the RGA predecessor id for a fresh `insert=true`
    /// op.
    pub fn list_insert_target(&self, obj: ObjId, index: usize) -> Result<ElemId> {
        let tree = self.tree(obj)?.as_list().ok_or_else(|| {
            ReplicaError::InvalidOperation(format!("{obj} is not a list"))
        })?;
        let len = tree.visible_order(|o| self.is_visible(o)).len();
        if index > len {
            return Err(ReplicaError::ListIndexOutOfRange(index));
        }
        Ok(tree.insert_target(index, |o| self.is_visible(o)))
    }

    // ---- move source extraction ----

    /// Extracts the "carried value" from whatever op currently sits at
    /// `key` within `obj`: the id to record as `moved_id`, and the
    /// scalar it carries if it's a scalar move.
    pub fn carried_value(&self, obj: ObjId, key: &Key) -> Result<(OpId, Option<ScalarValue>)> {
        let op = match key {
            Key::Map(prop) => self
                .tree(obj)?
                .as_map()
                .and_then(|t| t.get(prop, |o| self.is_visible(o)))
                .ok_or_else(|| ReplicaError::PropertyNotFound(prop.clone()))?,
            Key::Seq(elem) => self
                .tree(obj)?
                .as_list()
                .and_then(|t| t.visible_ops_at(*elem, |o| self.is_visible(o)).last())
                .ok_or(ReplicaError::ListIndexOutOfRange(0))?,
        };
        Ok(match &op.action {
            OpType::Make(_) => (op.id, None),
            OpType::Put(v) => (op.id, Some(v.clone())),
            OpType::Move { moved_id, .. } => {
                let scalar = match self.all_ops.get(moved_id).map(|o| &o.action) {
                    Some(OpType::Put(v)) => Some(v.clone()),
                    _ => None,
                };
                (*moved_id, scalar)
            }
            OpType::Delete => {
                return Err(ReplicaError::invariant("carried_value on a deleted slot"))
            }
        })
    }

    pub fn current_location(&self, subject: OpId) -> Option<(ObjId, Key)> {
        self.move_mgr.current_parent(subject)
    }

    /// Visible preds at an already-resolved `key` (map or list position),
    /// for building a MOVE whose source side is known by key rather than
    /// by a fresh index lookup — used by the `move_object` helper.
    pub fn preds_at_key(&self, obj: ObjId, key: &Key) -> Result<Vec<OpId>> {
        match key {
            Key::Map(prop) => self.map_preds(obj, prop),
            Key::Seq(elem) => {
                let tree = self.tree(obj)?.as_list().ok_or_else(|| {
                    ReplicaError::InvalidOperation(format!("{obj} is not a list"))
                })?;
                Ok(tree.visible_ops_at(*elem, |o| self.is_visible(o)).map(|o| o.id).collect())
            }
        }
    }

    // ---- insertion ----

    /// Inserts one freshly-produced local op, or a single remote op
    /// applied outside of bulk change processing, running the move
    /// manager's incremental update immediately afterward.
    #[instrument(level = "debug", skip(self, op), fields(op_id = %op.id))]
    pub fn insert_local(&mut self, op: Operation) {
        if self.clock.covers(&op.id) {
            return;
        }
        self.clock.include(op.id.actor, op.id.counter);
        self.bump_max_op(op.id.counter);
        self.all_ops.insert(op.id, op.clone());
        if let OpType::Make(t) = &op.action {
            let new_tree = match t {
                ObjType::Map => OpTree::new_map(),
                ObjType::List => OpTree::new_list(),
            };
            self.trees.insert(ObjId::Id(op.id), new_tree);
        }
        let actors = self.actors.clone();
        if let Ok(tree) = self.tree_mut(op.obj) {
            match tree {
                OpTree::Map(m) => m.insert(op.clone(), |a, b| actors.cmp_opid(a, b)),
                OpTree::List(l) => l.insert(op.clone(), |a, b| actors.cmp_opid(a, b)),
            }
        }
        let actors = self.actors.clone();
        self.move_mgr.incremental_update(&op, move |a, b| actors.cmp_opid(a, b));
    }

    /// Inserts a batch of ops belonging to one incoming change, without
    /// incremental validity updates, then runs bulk revalidation over
    /// the whole batch.
    #[instrument(level = "debug", skip(self, ops), fields(count = ops.len()))]
    pub fn insert_change_ops(&mut self, ops: Vec<Operation>) {
        let ops: Vec<Operation> = ops.into_iter().filter(|op| !self.clock.covers(&op.id)).collect();
        if ops.is_empty() {
            return;
        }
        for op in &ops {
            self.clock.include(op.id.actor, op.id.counter);
            self.bump_max_op(op.id.counter);
            self.all_ops.insert(op.id, op.clone());
            if let OpType::Make(t) = &op.action {
                let new_tree = match t {
                    ObjType::Map => OpTree::new_map(),
                    ObjType::List => OpTree::new_list(),
                };
                self.trees.insert(ObjId::Id(op.id), new_tree);
            }
        }
        let actors = self.actors.clone();
        for op in &ops {
            if let Ok(tree) = self.tree_mut(op.obj) {
                match tree {
                    OpTree::Map(m) => m.insert(op.clone(), |a, b| actors.cmp_opid(a, b)),
                    OpTree::List(l) => l.insert(op.clone(), |a, b| actors.cmp_opid(a, b)),
                }
            }
        }
        let actors = self.actors.clone();
        self.move_mgr.bulk_revalidate(ops, move |a, b| actors.cmp_opid(a, b));
    }
}
