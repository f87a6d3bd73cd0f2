//! Change assembly, content hashing, and the external wire form of an
//! operation.

use crate::exid::ExId;
use crate::indexed_cache::ActorIndex;
use crate::types::{ActorId, ChangeHash, ElemId, Key, ObjId, ObjType, OpId, OpType, Operation};
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ExternalElem {
    Head,
    Id(ExId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ExternalKey {
    Map(String),
    Seq(ExternalElem),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ExternalAction {
    Make(ObjType),
    Put(ScalarValue),
    Delete,
    Move { moved_id: ExId, move_src: ExId },
}

/// An operation as it appears on the wire: every id is an [`ExId`]
/// (full actor UUID), and the op's own id is *not* included — it is
/// positional, derived from the enclosing change's `actor` and
/// `start_op + index`, mirroring the columnar encoding's
/// "ops don't carry their own id" convention without adopting its
/// binary layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExternalOperation {
    obj: ExId,
    key: ExternalKey,
    action: ExternalAction,
    pred: Vec<ExId>,
    insert: bool,
}

fn export_opid(id: OpId, actors: &ActorIndex) -> ExId {
    ExId::Id(id.counter, actors.actor_id(id.actor).clone())
}

fn export_obj(obj: ObjId, actors: &ActorIndex) -> ExId {
    match obj {
        ObjId::Root => ExId::Root,
        ObjId::Id(id) => export_opid(id, actors),
    }
}

fn import_opid(ex: &ExId, actors: &mut ActorIndex) -> OpId {
    match ex {
        ExId::Root => OpId::ROOT,
        ExId::Id(counter, actor) => OpId::new(*counter, actors.cache(actor.clone())),
    }
}

fn import_obj(ex: &ExId, actors: &mut ActorIndex) -> ObjId {
    match ex {
        ExId::Root => ObjId::Root,
        ExId::Id(..) => ObjId::Id(import_opid(ex, actors)),
    }
}

impl ExternalOperation {
    fn from_internal(op: &Operation, actors: &ActorIndex) -> Self {
        ExternalOperation {
            obj: export_obj(op.obj, actors),
            key: match &op.key {
                Key::Map(s) => ExternalKey::Map(s.clone()),
                Key::Seq(ElemId::Head) => ExternalKey::Seq(ExternalElem::Head),
                Key::Seq(ElemId::Id(id)) => ExternalKey::Seq(ExternalElem::Id(export_opid(*id, actors))),
            },
            action: match &op.action {
                OpType::Make(t) => ExternalAction::Make(*t),
                OpType::Put(v) => ExternalAction::Put(v.clone()),
                OpType::Delete => ExternalAction::Delete,
                OpType::Move { moved_id, move_src } => ExternalAction::Move {
                    moved_id: export_opid(*moved_id, actors),
                    move_src: export_obj(*move_src, actors),
                },
            },
            pred: op.pred.iter().map(|&id| export_opid(id, actors)).collect(),
            insert: op.insert,
        }
    }

    fn into_internal(self, id: OpId, actors: &mut ActorIndex) -> Operation {
        Operation {
            id,
            obj: import_obj(&self.obj, actors),
            key: match self.key {
                ExternalKey::Map(s) => Key::Map(s),
                ExternalKey::Seq(ExternalElem::Head) => Key::Seq(ElemId::Head),
                ExternalKey::Seq(ExternalElem::Id(e)) => Key::Seq(ElemId::Id(import_opid(&e, actors))),
            },
            action: match self.action {
                ExternalAction::Make(t) => OpType::Make(t),
                ExternalAction::Put(v) => OpType::Put(v),
                ExternalAction::Delete => OpType::Delete,
                ExternalAction::Move { moved_id, move_src } => OpType::Move {
                    moved_id: import_opid(&moved_id, actors),
                    move_src: import_obj(&move_src, actors),
                },
            },
            pred: self.pred.iter().map(|e| import_opid(e, actors)).collect(),
            succ: Vec::new(),
            insert: self.insert,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExternalChange {
    actor: ActorId,
    seq: u64,
    start_op: u64,
    deps: Vec<ChangeHash>,
    ops: Vec<ExternalOperation>,
    hash: ChangeHash,
}

fn content_hash(actor: &ActorId, seq: u64, start_op: u64, deps: &[ChangeHash], ops: &[ExternalOperation]) -> ChangeHash {
    let preimage = ExternalChange {
        actor: actor.clone(),
        seq,
        start_op,
        deps: deps.to_vec(),
        ops: ops.to_vec(),
        hash: ChangeHash([0; 32]),
    };
    let bytes = serde_json::to_vec(&preimage).expect("change preimage always serializes");
    let digest = Sha256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ChangeHash(out)
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeChangeError {
    #[error("invalid change encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("change hash does not match its content")]
    HashMismatch,
}

/// A causally-linked batch of operations produced by one `commit`. `ops`
/// are already in internal (locally-indexed) form; use
/// [`Change::encode`]/[`Change::decode`] to cross the external boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub actor: ActorId,
    pub seq: u64,
    pub start_op: u64,
    pub deps: Vec<ChangeHash>,
    pub ops: Vec<Operation>,
    pub hash: ChangeHash,
}

impl Change {
    pub fn new(actor: ActorId, seq: u64, start_op: u64, deps: Vec<ChangeHash>, ops: Vec<Operation>, actors: &ActorIndex) -> Self {
        let ext_ops: Vec<ExternalOperation> = ops.iter().map(|o| ExternalOperation::from_internal(o, actors)).collect();
        let hash = content_hash(&actor, seq, start_op, &deps, &ext_ops);
        Change { actor, seq, start_op, deps, ops, hash }
    }

    pub fn encode(&self, actors: &ActorIndex) -> Vec<u8> {
        let ext_ops: Vec<ExternalOperation> = self.ops.iter().map(|o| ExternalOperation::from_internal(o, actors)).collect();
        let payload = ExternalChange {
            actor: self.actor.clone(),
            seq: self.seq,
            start_op: self.start_op,
            deps: self.deps.clone(),
            ops: ext_ops,
            hash: self.hash,
        };
        serde_json::to_vec(&payload).expect("change always serializes")
    }

    pub fn decode(bytes: &[u8], actors: &mut ActorIndex) -> Result<Self, DecodeChangeError> {
        let payload: ExternalChange = serde_json::from_slice(bytes)?;
        let expected = content_hash(&payload.actor, payload.seq, payload.start_op, &payload.deps, &payload.ops);
        if expected != payload.hash {
            return Err(DecodeChangeError::HashMismatch);
        }
        let actor_idx = actors.cache(payload.actor.clone());
        let ops = payload
            .ops
            .into_iter()
            .enumerate()
            .map(|(i, ext)| ext.into_internal(OpId::new(payload.start_op + i as u64, actor_idx), actors))
            .collect();
        Ok(Change {
            actor: payload.actor,
            seq: payload.seq,
            start_op: payload.start_op,
            deps: payload.deps,
            ops,
            hash: payload.hash,
        })
    }
}
