//! The per-commit handle on a replica, modeled on automerge's
//! `transaction::inner` dispatch between a map op and a list op,
//! generalized here to also dispatch a MOVE's source and destination
//! sides.

use crate::change::Change;
use crate::error::{ReplicaError, Result};
use crate::replica::Replica;
use crate::types::{ChangeHash, Key, ObjId, ObjType, OpId, OpType, Prop};
use crate::value::ScalarValue;
use crate::op_set::Datum;
use crate::exid::ExId;
use tracing::instrument;

pub struct Transaction<'a> {
    replica: &'a mut Replica,
    ops: Vec<crate::types::Operation>,
    start_op: u64,
    next_counter: u64,
    deps: Vec<ChangeHash>,
    self_actor_idx: usize,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(replica: &'a mut Replica) -> Self {
        let start_op = replica.op_set.next_counter();
        let deps = replica.frontier.clone();
        let self_actor_idx = replica.op_set.actors.self_index();
        Transaction {
            replica,
            ops: Vec::new(),
            start_op,
            next_counter: start_op,
            deps,
            self_actor_idx,
        }
    }

    fn alloc_id(&mut self) -> OpId {
        let id = OpId::new(self.next_counter, self.self_actor_idx);
        self.next_counter += 1;
        id
    }

    fn resolve(&self, ex: &ExId) -> Result<ObjId> {
        match ex {
            ExId::Root => Ok(ObjId::Root),
            ExId::Id(counter, actor) => {
                let idx = self
                    .replica
                    .op_set
                    .actors
                    .lookup(actor)
                    .ok_or_else(|| ReplicaError::invariant("reference to an unknown actor"))?;
                Ok(ObjId::Id(OpId::new(*counter, idx)))
            }
        }
    }

    pub fn get(&self, obj: &ExId, prop: impl Into<Prop>) -> Result<Datum> {
        let obj = self.resolve(obj)?;
        match prop.into() {
            Prop::Map(k) => self.replica.op_set.map_get(obj, &k),
            Prop::Seq(i) => self.replica.op_set.list_get(obj, i),
        }
    }

    pub fn len(&self, obj: &ExId) -> Result<usize> {
        let obj = self.resolve(obj)?;
        self.replica.op_set.list_len(obj)
    }

    fn local_map_op(&mut self, obj: ObjId, prop: String, action: OpType) -> Result<OpId> {
        let pred = self.replica.op_set.map_pred_for_write(obj, &prop)?;
        let id = self.alloc_id();
        let op = crate::types::Operation { id, obj, key: Key::Map(prop), action, pred, succ: vec![], insert: false };
        self.replica.op_set.insert_local(op.clone());
        self.ops.push(op);
        Ok(id)
    }

    fn local_list_overwrite_op(&mut self, obj: ObjId, index: usize, action: OpType) -> Result<OpId> {
        let (elem, pred) = self.replica.op_set.list_elem_for_overwrite(obj, index)?;
        let id = self.alloc_id();
        let op = crate::types::Operation { id, obj, key: Key::Seq(elem), action, pred, succ: vec![], insert: false };
        self.replica.op_set.insert_local(op.clone());
        self.ops.push(op);
        Ok(id)
    }

    fn local_list_insert_op(&mut self, obj: ObjId, index: usize, action: OpType) -> Result<OpId> {
        let target = self.replica.op_set.list_insert_target(obj, index)?;
        let id = self.alloc_id();
        let op = crate::types::Operation { id, obj, key: Key::Seq(target), action, pred: vec![], succ: vec![], insert: true };
        self.replica.op_set.insert_local(op.clone());
        self.ops.push(op);
        Ok(id)
    }

    #[instrument(level = "debug", skip(self, value))]
    pub fn put(&mut self, obj: &ExId, prop: impl Into<Prop>, value: impl Into<ScalarValue>) -> Result<()> {
        let obj = self.resolve(obj)?;
        match prop.into() {
            Prop::Map(k) => self.local_map_op(obj, k, OpType::Put(value.into()))?,
            Prop::Seq(i) => self.local_list_overwrite_op(obj, i, OpType::Put(value.into()))?,
        };
        Ok(())
    }

    pub fn delete(&mut self, obj: &ExId, prop: impl Into<Prop>) -> Result<()> {
        let obj = self.resolve(obj)?;
        match prop.into() {
            Prop::Map(k) => self.local_map_op(obj, k, OpType::Delete)?,
            Prop::Seq(i) => self.local_list_overwrite_op(obj, i, OpType::Delete)?,
        };
        Ok(())
    }

    pub fn put_object(&mut self, obj: &ExId, prop: impl Into<Prop>, obj_type: ObjType) -> Result<ExId> {
        let obj = self.resolve(obj)?;
        let id = match prop.into() {
            Prop::Map(k) => self.local_map_op(obj, k, OpType::Make(obj_type))?,
            Prop::Seq(i) => self.local_list_overwrite_op(obj, i, OpType::Make(obj_type))?,
        };
        Ok(self.replica.op_set.export_id(ObjId::Id(id)))
    }

    pub fn insert(&mut self, obj: &ExId, index: usize, value: impl Into<ScalarValue>) -> Result<()> {
        let obj = self.resolve(obj)?;
        if self.replica.op_set.object_type(obj) != Some(ObjType::List) {
            return Err(ReplicaError::InvalidOperation("insert is only valid on a list".into()));
        }
        self.local_list_insert_op(obj, index, OpType::Put(value.into()))?;
        Ok(())
    }

    pub fn insert_object(&mut self, obj: &ExId, index: usize, obj_type: ObjType) -> Result<ExId> {
        let obj = self.resolve(obj)?;
        if self.replica.op_set.object_type(obj) != Some(ObjType::List) {
            return Err(ReplicaError::InvalidOperation("insert_object is only valid on a list".into()));
        }
        let id = self.local_list_insert_op(obj, index, OpType::Make(obj_type))?;
        Ok(self.replica.op_set.export_id(ObjId::Id(id)))
    }

    fn resolve_src(&self, obj: ObjId, prop: Prop) -> Result<(Key, Vec<OpId>)> {
        match prop {
            Prop::Map(k) => {
                let pred = self.replica.op_set.map_pred_for_write(obj, &k)?;
                Ok((Key::Map(k), pred))
            }
            Prop::Seq(i) => {
                let (elem, pred) = self.replica.op_set.list_elem_for_overwrite(obj, i)?;
                Ok((Key::Seq(elem), pred))
            }
        }
    }

    fn resolve_dst(&self, obj: ObjId, prop: Prop) -> Result<(Key, Vec<OpId>, bool)> {
        match prop {
            Prop::Map(k) => {
                let pred = self.replica.op_set.map_pred_for_write(obj, &k)?;
                Ok((Key::Map(k), pred, false))
            }
            Prop::Seq(i) => {
                let elem = self.replica.op_set.list_insert_target(obj, i)?;
                Ok((Key::Seq(elem), Vec::new(), true))
            }
        }
    }

    fn move_internal(
        &mut self,
        src_obj: ObjId,
        src_key: Key,
        src_pred: Vec<OpId>,
        dst_obj: ObjId,
        dst_key: Key,
        dst_pred: Vec<OpId>,
        insert: bool,
    ) -> Result<()> {
        let (moved_id, _carried) = self.replica.op_set.carried_value(src_obj, &src_key)?;
        let mut pred = src_pred;
        for p in dst_pred {
            if !pred.contains(&p) {
                pred.push(p);
            }
        }
        let id = self.alloc_id();
        let op = crate::types::Operation {
            id,
            obj: dst_obj,
            key: dst_key,
            action: OpType::Move { moved_id, move_src: src_obj },
            pred,
            succ: Vec::new(),
            insert,
        };
        self.replica.op_set.insert_local(op.clone());
        self.ops.push(op);
        Ok(())
    }

    /// Moves whatever currently sits at `(src_obj, src_prop)` to
    /// `(dst_obj, dst_prop)`.
    #[instrument(level = "debug", skip(self))]
    pub fn move_value(
        &mut self,
        src_obj: &ExId,
        src_prop: impl Into<Prop>,
        dst_obj: &ExId,
        dst_prop: impl Into<Prop>,
    ) -> Result<()> {
        let src_obj_id = self.resolve(src_obj)?;
        let dst_obj_id = self.resolve(dst_obj)?;
        let (src_key, src_pred) = self.resolve_src(src_obj_id, src_prop.into())?;
        let (dst_key, dst_pred, insert) = self.resolve_dst(dst_obj_id, dst_prop.into())?;
        self.move_internal(src_obj_id, src_key, src_pred, dst_obj_id, dst_key, dst_pred, insert)
    }

    /// Re-parents an object to `dst_obj`, keeping its current property
    /// name if it lives in a map. An object currently in a list is
    /// appended to the end of the destination list — a list position id
    /// has no meaning outside the list that created it, so "the same
    /// prop" can't be preserved literally across a list boundary.
    pub fn move_object(&mut self, subject: &ExId, dst_obj: &ExId) -> Result<()> {
        let subject_obj = self.resolve(subject)?;
        let subject_id = match subject_obj {
            ObjId::Id(id) => id,
            ObjId::Root => return Err(ReplicaError::InvalidOperation("cannot move the root object".into())),
        };
        let (parent, key) = self
            .replica
            .op_set
            .current_location(subject_id)
            .ok_or_else(|| ReplicaError::invariant("subject has no recorded parent"))?;
        let dst_obj_id = self.resolve(dst_obj)?;
        let src_pred = self.replica.op_set.preds_at_key(parent, &key)?;
        let dst_prop = match &key {
            Key::Map(name) => Prop::Map(name.clone()),
            Key::Seq(_) => Prop::Seq(self.replica.op_set.list_len(dst_obj_id).unwrap_or(0)),
        };
        let (dst_key, dst_pred, insert) = self.resolve_dst(dst_obj_id, dst_prop)?;
        self.move_internal(parent, key, src_pred, dst_obj_id, dst_key, dst_pred, insert)
    }

    /// Builds the accumulated ops into a [`Change`], appends it to the
    /// replica's history, and advances its frontier. Returns `None`
    /// without touching history if the transaction made no changes.
    #[instrument(level = "debug", skip(self))]
    pub fn commit(self) -> Option<ChangeHash> {
        if self.ops.is_empty() {
            return None;
        }
        let actor = self.replica.op_set.actors.self_actor_id().clone();
        let seq = self.replica.next_seq();
        let change = Change::new(actor, seq, self.start_op, self.deps, self.ops, &self.replica.op_set.actors);
        let hash = self.replica.append_local_change(change);
        Some(hash)
    }
}
