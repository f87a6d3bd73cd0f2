//! Per-object presence history.

use crate::types::OpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleKind {
    Present,
    Trash,
}

/// The ordered history of presence/trash events for one subject (an
/// object id, or the op id of a scalar PUT/MOVE). Events are pushed in
/// increasing op_id order as ops are applied; `status_at(t)` walks
/// backward from the latest event whose own id is no greater than `t`
/// (in the cross-replica total order) to the first such event whose
/// authoring op is still [valid](crate::move_manager), since only a
/// MOVE's trash/present event can ever be retracted (PUT/MAKE/DELETE are
/// always valid). Querying "at" the asking operation's own id, rather
/// than always the latest event, matters once a trash/present event can
/// itself be reverted and replayed out of order: a cycle check run
/// while earlier entries are mid-replay must see the history as it
/// stood at its own position, not whatever the log currently holds.
#[derive(Debug, Clone, Default)]
pub(crate) struct LifecycleList {
    events: Vec<(OpId, LifecycleKind)>,
}

impl LifecycleList {
    pub fn new(created_at: OpId) -> Self {
        LifecycleList {
            events: vec![(created_at, LifecycleKind::Present)],
        }
    }

    pub fn push_present(&mut self, at: OpId) {
        self.events.push((at, LifecycleKind::Present));
    }

    pub fn push_trash(&mut self, at: OpId) {
        self.events.push((at, LifecycleKind::Trash));
    }

    /// Undoes the most recently pushed event with id `at`, if it's the
    /// tail. Used when a move is reverted during incremental/bulk
    /// revalidation and its lifecycle side-effect must come back off too.
    pub fn pop_if(&mut self, at: OpId) {
        if self.events.last().map(|(id, _)| *id) == Some(at) {
            self.events.pop();
        }
    }

    pub fn status_at(
        &self,
        at: OpId,
        is_valid: impl Fn(OpId) -> bool,
        cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering,
    ) -> LifecycleKind {
        self.events
            .iter()
            .rev()
            .find(|(id, _)| cmp_id(*id, at) != std::cmp::Ordering::Greater && is_valid(*id))
            .map(|(_, kind)| *kind)
            .unwrap_or(LifecycleKind::Present)
    }

    pub fn is_trashed_at(
        &self,
        at: OpId,
        is_valid: impl Fn(OpId) -> bool,
        cmp_id: &impl Fn(OpId, OpId) -> std::cmp::Ordering,
    ) -> bool {
        self.status_at(at, is_valid, cmp_id) == LifecycleKind::Trash
    }
}
