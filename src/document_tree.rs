//! Parent/property tracking across the whole document.

use crate::types::{Key, ObjId, OpId};
use std::collections::HashMap;

/// Maps every subject (an object id, or the op id of a scalar PUT/MOVE
/// target) to its current parent object and the property it occupies
/// there. This is the structure the move manager's ancestor-cycle check
/// walks.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentTree {
    parent: HashMap<OpId, ObjId>,
    prop: HashMap<OpId, Key>,
}

impl DocumentTree {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn parent_of(&self, subject: OpId) -> Option<ObjId> {
        self.parent.get(&subject).copied()
    }

    pub fn prop_of(&self, subject: OpId) -> Option<&Key> {
        self.prop.get(&subject)
    }

    /// Registers a brand-new subject (MAKE or PUT) under `parent`/`prop`.
    pub fn register(&mut self, subject: OpId, parent: ObjId, prop: Key) {
        self.parent.insert(subject, parent);
        self.prop.insert(subject, prop);
    }

    /// Re-parents `subject`, returning the old `(parent, prop)` so the
    /// move manager can restore it on revert.
    pub fn set_parent(
        &mut self,
        subject: OpId,
        new_parent: ObjId,
        new_prop: Key,
    ) -> (Option<ObjId>, Option<Key>) {
        let old_parent = self.parent.insert(subject, new_parent);
        let old_prop = self.prop.insert(subject, new_prop);
        (old_parent, old_prop)
    }

    /// Restores a previously shadowed parent/prop pair, or removes the
    /// entry entirely if the subject never had one (it was created by
    /// the very move being reverted).
    pub fn restore_parent(&mut self, subject: OpId, parent: Option<ObjId>, prop: Option<Key>) {
        match parent {
            Some(p) => {
                self.parent.insert(subject, p);
            }
            None => {
                self.parent.remove(&subject);
            }
        }
        match prop {
            Some(p) => {
                self.prop.insert(subject, p);
            }
            None => {
                self.prop.remove(&subject);
            }
        }
    }

    /// Is `mid` an ancestor of `oid` in the tree right now? Walks the
    /// parent chain starting at `oid`. The walk stops early — reporting
    /// "not an ancestor" — the moment it reaches a node that is itself
    /// trashed, *unless* that node is `mid` (checked first, so a move
    /// targeting a trashed node directly is still caught as a cycle).
    /// `is_trashed` is expected to answer "trashed as of the querying
    /// move's own op id", not "trashed right now" — the caller
    /// ([`crate::move_manager::MoveManager::install_move`]) closes over
    /// that op id and the cross-replica comparator before calling in.
    pub fn is_ancestor(
        &self,
        mid: OpId,
        oid: ObjId,
        is_trashed: impl Fn(OpId) -> bool,
    ) -> bool {
        let mut current = oid;
        loop {
            let subject = match current {
                ObjId::Root => return false,
                ObjId::Id(id) => id,
            };
            if subject == mid {
                return true;
            }
            if is_trashed(subject) {
                return false;
            }
            match self.parent_of(subject) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }
}
