//! Per-object operation logs. Kept as plain `Vec`-backed structures with
//! linear scans rather than a const-generic B-tree: seeks never need to
//! be sub-linear for documents of the size this crate targets.

mod list;
mod map;

pub(crate) use list::ListOpTree;
pub(crate) use map::MapOpTree;

/// One object's operation log: either a [`MapOpTree`] or a [`ListOpTree`],
/// chosen when the object is created from its [`crate::types::ObjType`].
#[derive(Debug, Clone)]
pub(crate) enum OpTree {
    Map(MapOpTree),
    List(ListOpTree),
}

impl OpTree {
    pub fn new_map() -> Self {
        OpTree::Map(MapOpTree::new())
    }

    pub fn new_list() -> Self {
        OpTree::List(ListOpTree::new())
    }

    pub fn as_map(&self) -> Option<&MapOpTree> {
        match self {
            OpTree::Map(m) => Some(m),
            OpTree::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListOpTree> {
        match self {
            OpTree::List(l) => Some(l),
            OpTree::Map(_) => None,
        }
    }
}
