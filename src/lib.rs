//! `movemerge`: a collaborative JSON-like CRDT replica that extends an
//! Automerge-style operation-based replicated data type with a
//! first-class MOVE operation on objects and scalar entries.
//!
//! A [`Replica`] holds a tree of nested maps and lists. Replicas mutate
//! independently through [`Transaction`]s, exchange self-describing
//! [`Change`]s, and converge deterministically — including when
//! concurrent moves would otherwise create a cycle or orphan a subtree.

mod change;
mod clock;
mod document_tree;
mod error;
mod exid;
mod indexed_cache;
mod lifecycle;
mod move_manager;
mod op_set;
mod op_tree;
mod replica;
mod transaction;
mod types;
mod value;

pub use change::{Change, DecodeChangeError};
pub use error::{InvalidActorId, ReplicaError, Result};
pub use exid::{ExId, ParseExIdError};
pub use op_set::{Datum, MovePolicy};
pub use replica::Replica;
pub use transaction::Transaction;
pub use types::{ActorId, ChangeHash, ObjType, ParseChangeHashError, Prop};
pub use value::{ScalarValue, Value};
