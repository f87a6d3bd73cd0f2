use crate::types::{ActorId, OpId};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Index;

/// Generic first-seen-order cache: assigns each distinct item a stable
/// local index the first time it's observed.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexedCache<T> {
    pub cache: Vec<T>,
    lookup: HashMap<T, usize>,
}

impl<T> IndexedCache<T>
where
    T: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        IndexedCache {
            cache: Default::default(),
            lookup: Default::default(),
        }
    }

    pub fn cache(&mut self, item: T) -> usize {
        if let Some(n) = self.lookup.get(&item) {
            *n
        } else {
            let n = self.cache.len();
            self.cache.push(item.clone());
            self.lookup.insert(item, n);
            n
        }
    }

    pub fn lookup(&self, item: &T) -> Option<usize> {
        self.lookup.get(item).copied()
    }

    pub fn get(&self, index: usize) -> &T {
        &self.cache[index]
    }

    pub fn sorted(&self) -> Vec<T> {
        self.cache.iter().sorted().cloned().collect()
    }
}

impl<T> Index<usize> for IndexedCache<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.cache[i]
    }
}

/// The per-replica actor-index assignment: actor index 0 is
/// reserved for the implicit root actor, and the replica's own actor
/// always gets index 1, mirroring `Automerge::get_actor_index`'s
/// first-use caching but with a fixed root/self convention instead of
/// "whoever shows up first".
#[derive(Debug, Clone)]
pub(crate) struct ActorIndex {
    actors: IndexedCache<ActorId>,
}

impl ActorIndex {
    pub fn new(self_actor: ActorId) -> Self {
        let mut actors = IndexedCache::new();
        let root = actors.cache(ActorId::root_placeholder());
        debug_assert_eq!(root, 0);
        let self_index = actors.cache(self_actor);
        debug_assert_eq!(self_index, 1);
        ActorIndex { actors }
    }

    /// Assigns (or returns the existing) local index for `actor`.
    pub fn cache(&mut self, actor: ActorId) -> usize {
        self.actors.cache(actor)
    }

    pub fn lookup(&self, actor: &ActorId) -> Option<usize> {
        self.actors.lookup(actor)
    }

    pub fn actor_id(&self, index: usize) -> &ActorId {
        self.actors.get(index)
    }

    pub fn self_actor_id(&self) -> &ActorId {
        self.actors.get(1)
    }

    /// The replica's own fixed actor index, per the root=0/self=1
    /// convention established in [`Self::new`].
    pub fn self_index(&self) -> usize {
        1
    }

    /// The cross-replica total order: primarily by
    /// `counter`, tie-broken by the actor's UUID, lexicographically.
    pub fn cmp_opid(&self, a: OpId, b: OpId) -> Ordering {
        match a.counter.cmp(&b.counter) {
            Ordering::Equal => self.actor_id(a.actor).cmp(self.actor_id(b.actor)),
            order => order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_self_get_fixed_indices() {
        let idx = ActorIndex::new(ActorId::random());
        assert_eq!(idx.actor_id(0), &ActorId::root_placeholder());
        assert_eq!(idx.lookup(idx.self_actor_id()), Some(1));
    }

    #[test]
    fn cmp_opid_breaks_ties_on_actor_uuid() {
        let mut idx = ActorIndex::new(ActorId::random());
        let other = idx.cache(ActorId::random());
        let self_idx = 1;
        let (lo, hi) = if idx.actor_id(self_idx) < idx.actor_id(other) {
            (self_idx, other)
        } else {
            (other, self_idx)
        };
        let a = OpId::new(5, lo);
        let b = OpId::new(5, hi);
        assert_eq!(idx.cmp_opid(a, b), Ordering::Less);
        assert_eq!(idx.cmp_opid(b, a), Ordering::Greater);
    }
}
