use crate::types::OpId;
use fxhash::FxBuildHasher;
use std::cmp;
use std::collections::HashMap;

/// A vector clock over actor indices: the highest counter seen for each
/// actor. Used to decide whether an `OpId` referenced by a `pred`/`succ`
/// is already covered by what's been applied so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Clock(HashMap<usize, u64, FxBuildHasher>);

impl Clock {
    pub fn new() -> Self {
        Clock(Default::default())
    }

    pub fn include(&mut self, actor: usize, counter: u64) {
        self.0
            .entry(actor)
            .and_modify(|m| *m = cmp::max(counter, *m))
            .or_insert(counter);
    }

    pub fn covers(&self, id: &OpId) -> bool {
        match self.0.get(&id.actor) {
            Some(val) => *val >= id.counter,
            None => false,
        }
    }
}
