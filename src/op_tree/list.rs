use crate::types::{ElemId, OpId, Operation};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A list object's operations, realizing the RGA total order.
///
/// `children` records, for every position (including the virtual `Head`),
/// the ids of positions inserted directly after it, kept in **descending**
/// op_id order per the RGA tie-break. `slots` records the op history at
/// each position (the inserting op first, then any overwriting PUT/
/// DELETE/MOVE ops), ascending by op_id. The visible flat order is a
/// pre-order walk of `children` starting from `Head`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ListOpTree {
    children: HashMap<ElemId, Vec<OpId>>,
    slots: HashMap<ElemId, Vec<Operation>>,
}

impl ListOpTree {
    pub fn new() -> Self {
        Default::default()
    }

    fn last_visible<'a>(
        slot: &'a [Operation],
        is_visible: &impl Fn(&Operation) -> bool,
    ) -> Option<&'a Operation> {
        slot.iter().rev().find(|o| is_visible(o))
    }

    fn visit(
        &self,
        node: ElemId,
        is_visible: &impl Fn(&Operation) -> bool,
        out: &mut Vec<ElemId>,
    ) {
        let Some(kids) = self.children.get(&node) else {
            return;
        };
        for &child_op in kids {
            let child = ElemId::Id(child_op);
            if let Some(slot) = self.slots.get(&child) {
                if Self::last_visible(slot, is_visible).is_some() {
                    out.push(child);
                }
            }
            self.visit(child, is_visible, out);
        }
    }

    /// The full visible linear order, left to right.
    pub fn visible_order(&self, is_visible: impl Fn(&Operation) -> bool) -> Vec<ElemId> {
        let mut out = Vec::new();
        self.visit(ElemId::Head, &is_visible, &mut out);
        out
    }

    /// The op at the n-th visible position, if any.
    pub fn get(&self, n: usize, is_visible: impl Fn(&Operation) -> bool) -> Option<&Operation> {
        let order = self.visible_order(&is_visible);
        let elem = order.get(n)?;
        self.slots.get(elem).and_then(|s| Self::last_visible(s, &is_visible))
    }

    /// Every currently visible op at position `elem` (used to build
    /// `pred` for an overwrite at an existing position). Empty if `elem`
    /// is unknown.
    pub fn visible_ops_at<'a>(
        &'a self,
        elem: ElemId,
        is_visible: impl Fn(&Operation) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Operation> + 'a {
        self.slots
            .get(&elem)
            .into_iter()
            .flat_map(move |s| s.iter().filter(move |o| is_visible(o)))
    }

    /// The RGA position id to use as the `prop` of a new `insert=true` op
    /// landing at visible index `n` (i.e. immediately after the n-th
    /// visible element, or at `Head` if `n == 0`).
    pub fn insert_target(&self, n: usize, is_visible: impl Fn(&Operation) -> bool) -> ElemId {
        if n == 0 {
            ElemId::Head
        } else {
            let order = self.visible_order(is_visible);
            order[n - 1]
        }
    }

    /// Inserts a fresh RGA position (`op.insert == true`), attaching it as
    /// a child of the element named by `op.key`.
    pub fn insert_new(&mut self, op: Operation, cmp_id: impl Fn(OpId, OpId) -> Ordering) {
        debug_assert!(op.insert);
        let parent = op.key.elemid().expect("list op must key by elemid");
        let elem = ElemId::Id(op.id);
        if self.slots.contains_key(&elem) {
            return;
        }
        let siblings = self.children.entry(parent).or_default();
        let pos = siblings
            .iter()
            .position(|&id| cmp_id(op.id, id) == Ordering::Greater)
            .unwrap_or(siblings.len());
        siblings.insert(pos, op.id);
        self.slots.insert(elem, vec![op]);
        self.children.entry(elem).or_default();
    }

    /// Inserts an overwrite op (`op.insert == false`) at an existing
    /// position, linking it onto the `succ` of whatever it overwrites.
    pub fn insert_overwrite(&mut self, op: Operation, cmp_id: impl Fn(OpId, OpId) -> Ordering) {
        debug_assert!(!op.insert);
        let elem = op.key.elemid().expect("list op must key by elemid");
        let slot = self
            .slots
            .get_mut(&elem)
            .expect("overwrite at unknown list position");
        if slot.iter().any(|o| o.id == op.id) {
            return;
        }
        for existing in slot.iter_mut() {
            if op.overwrites(existing) {
                existing.add_succ(op.id);
            }
        }
        let pos = slot
            .iter()
            .position(|o| cmp_id(op.id, o.id) == Ordering::Less)
            .unwrap_or(slot.len());
        slot.insert(pos, op);
    }

    /// Dispatches to [`Self::insert_new`] or [`Self::insert_overwrite`]
    /// based on `op.insert`.
    pub fn insert(&mut self, op: Operation, cmp_id: impl Fn(OpId, OpId) -> Ordering) {
        if op.insert {
            self.insert_new(op, cmp_id);
        } else {
            self.insert_overwrite(op, cmp_id);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, ObjId, OpType};
    use crate::value::ScalarValue;

    fn cmp(a: OpId, b: OpId) -> Ordering {
        a.cmp(&b)
    }

    fn insert_op(id: u64, actor: usize, after: ElemId, val: i64) -> Operation {
        Operation {
            id: OpId::new(id, actor),
            obj: ObjId::Root,
            key: Key::Seq(after),
            action: OpType::Put(ScalarValue::Int(val)),
            pred: vec![],
            succ: vec![],
            insert: true,
        }
    }

    fn always_visible(op: &Operation) -> bool {
        op.succ.is_empty() && !op.action.is_delete()
    }

    #[test]
    fn sequential_inserts_at_head_reverse() {
        let mut tree = ListOpTree::new();
        tree.insert_new(insert_op(1, 1, ElemId::Head, 10), cmp);
        tree.insert_new(insert_op(2, 1, ElemId::Head, 20), cmp);
        tree.insert_new(insert_op(3, 1, ElemId::Head, 30), cmp);
        let order = tree.visible_order(always_visible);
        let vals: Vec<_> = order
            .iter()
            .map(|e| tree.slots.get(e).unwrap().last().unwrap())
            .collect();
        assert_eq!(vals[0].action, OpType::Put(ScalarValue::Int(30)));
        assert_eq!(vals[1].action, OpType::Put(ScalarValue::Int(20)));
        assert_eq!(vals[2].action, OpType::Put(ScalarValue::Int(10)));
    }

    #[test]
    fn insert_after_existing_element() {
        let mut tree = ListOpTree::new();
        tree.insert_new(insert_op(1, 1, ElemId::Head, 10), cmp);
        let first = ElemId::Id(OpId::new(1, 1));
        tree.insert_new(insert_op(2, 1, first, 20), cmp);
        let order = tree.visible_order(always_visible);
        assert_eq!(order, vec![first, ElemId::Id(OpId::new(2, 1))]);
    }

    #[test]
    fn overwrite_hides_element() {
        let mut tree = ListOpTree::new();
        tree.insert_new(insert_op(1, 1, ElemId::Head, 10), cmp);
        let elem = ElemId::Id(OpId::new(1, 1));
        let del = Operation {
            id: OpId::new(2, 1),
            obj: ObjId::Root,
            key: Key::Seq(elem),
            action: OpType::Delete,
            pred: vec![OpId::new(1, 1)],
            succ: vec![],
            insert: false,
        };
        tree.insert_overwrite(del, cmp);
        assert!(tree.visible_order(always_visible).is_empty());
    }
}
