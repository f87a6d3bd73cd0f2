use crate::types::{OpId, Operation};
use std::cmp::Ordering;

/// A map object's operations, kept sorted by `(prop, op_id)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct MapOpTree {
    ops: Vec<Operation>,
}

impl MapOpTree {
    pub fn new() -> Self {
        Default::default()
    }

    fn slot_bounds(&self, prop: &str) -> (usize, usize) {
        let start = self
            .ops
            .partition_point(|o| o.key.as_map_key().expect("map op") < prop);
        let mut end = start;
        while end < self.ops.len() && self.ops[end].key.as_map_key() == Some(prop) {
            end += 1;
        }
        (start, end)
    }

    /// All currently visible ops at `prop`, in op_id order. Used to build
    /// the `pred` set of a new local op, or the `pred` of a MOVE source.
    pub fn visible_ops<'a>(
        &'a self,
        prop: &str,
        is_visible: impl Fn(&Operation) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Operation> + 'a {
        let (start, end) = self.slot_bounds(prop);
        self.ops[start..end].iter().filter(move |o| is_visible(o))
    }

    /// The last visible op at `prop`, or `None` if the slot is empty or
    /// fully overwritten/invalid.
    pub fn get(&self, prop: &str, is_visible: impl Fn(&Operation) -> bool) -> Option<&Operation> {
        let (start, end) = self.slot_bounds(prop);
        self.ops[start..end].iter().rev().find(|o| is_visible(o))
    }

    /// Inserts `op` into its slot, linking it onto the `succ` list of every
    /// op it overwrites. A no-op if an op with the same id is already
    /// present (idempotent re-delivery).
    pub fn insert(&mut self, op: Operation, cmp_id: impl Fn(OpId, OpId) -> Ordering) {
        let prop = op.key.as_map_key().expect("map op must key by prop").to_owned();
        let (start, end) = self.slot_bounds(&prop);
        if self.ops[start..end].iter().any(|o| o.id == op.id) {
            return;
        }
        for existing in &mut self.ops[start..end] {
            if op.overwrites(existing) {
                existing.add_succ(op.id);
            }
        }
        let pos = self.ops[start..end]
            .iter()
            .position(|o| cmp_id(op.id, o.id) == Ordering::Less)
            .map(|i| start + i)
            .unwrap_or(end);
        self.ops.insert(pos, op);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, ObjId, OpType};
    use crate::value::ScalarValue;

    fn put(id: u64, actor: usize, prop: &str, val: i64, pred: Vec<OpId>) -> Operation {
        Operation {
            id: OpId::new(id, actor),
            obj: ObjId::Root,
            key: Key::Map(prop.to_owned()),
            action: OpType::Put(ScalarValue::Int(val)),
            pred,
            succ: vec![],
            insert: false,
        }
    }

    fn always_visible(op: &Operation) -> bool {
        op.succ.is_empty() && !op.action.is_delete()
    }

    fn cmp(a: OpId, b: OpId) -> Ordering {
        a.cmp(&b)
    }

    #[test]
    fn put_then_overwrite() {
        let mut tree = MapOpTree::new();
        let a = put(1, 1, "x", 1, vec![]);
        tree.insert(a, cmp);
        let existing_id = tree.get("x", always_visible).unwrap().id;
        let b = put(2, 1, "x", 2, vec![existing_id]);
        tree.insert(b, cmp);
        let visible = tree.get("x", always_visible).unwrap();
        assert_eq!(visible.id, OpId::new(2, 1));
    }

    #[test]
    fn concurrent_writers_coexist() {
        let mut tree = MapOpTree::new();
        tree.insert(put(1, 1, "x", 1, vec![]), cmp);
        tree.insert(put(1, 2, "x", 2, vec![]), cmp);
        let count = tree.visible_ops("x", always_visible).count();
        assert_eq!(count, 2);
    }
}
