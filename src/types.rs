//! Core identifiers and the tagged operation record.

use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

/// A 128-bit actor identifier. Two replicas never need to agree on how
/// actors are indexed locally; only the bytes here are ever compared across
/// replicas (see [`crate::indexed_cache::IndexedCache`] for the local
/// actor-index assignment).
#[derive(Eq, PartialEq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(#[serde(with = "hex_bytes")] Vec<u8>);

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorId").field(&hex::encode(&self.0)).finish()
    }
}

impl ActorId {
    pub fn random() -> ActorId {
        ActorId(uuid::Uuid::new_v4().as_bytes().to_vec())
    }

    /// The reserved id for the implicit root-object actor. Never assigned
    /// to a real replica; used only to construct [`OpId::ROOT`].
    pub(crate) fn root_placeholder() -> ActorId {
        ActorId(vec![0; 16])
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex_string(&self) -> String {
        hex::encode(&self.0)
    }
}

impl TryFrom<&str> for ActorId {
    type Error = crate::error::InvalidActorId;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        hex::decode(s)
            .map(ActorId)
            .map_err(|_| crate::error::InvalidActorId(s.into()))
    }
}

impl From<uuid::Uuid> for ActorId {
    fn from(u: uuid::Uuid) -> Self {
        ActorId(u.as_bytes().to_vec())
    }
}

impl FromStr for ActorId {
    type Err = crate::error::InvalidActorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActorId::try_from(s)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

/// Totally ordered operation identifier: a Lamport
/// `counter` paired with a small per-replica `actor` index. The true total
/// order (counter, then actor UUID lexicographically) needs the actor
/// cache, so `OpId` itself only derives `Eq`/`Hash`/`Ord`-by-fields for use
/// as a map key; real comparisons go through
/// [`crate::indexed_cache::ActorIndex::cmp_opid`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OpId {
    pub counter: u64,
    pub actor: usize,
}

impl OpId {
    /// `(0, 0)` — the implicit root object. Actor index 0 is reserved and
    /// never assigned to a real actor.
    pub const ROOT: OpId = OpId { counter: 0, actor: 0 };

    /// `(u64::MAX, 0)` — internal placeholder, never a real operation id.
    pub const NULL: OpId = OpId { counter: u64::MAX, actor: 0 };

    pub fn new(counter: u64, actor: usize) -> Self {
        OpId { counter, actor }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor)
    }
}

/// Cheap field-order comparison used only for deterministic iteration
/// within a single replica (e.g. sorting a change's own ops by counter
/// before handing them to the move manager). This is **not** the
/// cross-replica total order — use `ActorIndex::cmp_opid` for that.
impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter.cmp(&other.counter).then(self.actor.cmp(&other.actor))
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The id of an object: either the implicit root map, or the id of the
/// MAKE operation that created it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ObjId {
    Root,
    Id(OpId),
}

impl ObjId {
    pub fn is_root(&self) -> bool {
        matches!(self, ObjId::Root)
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjId::Root => write!(f, "_root"),
            ObjId::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<OpId> for ObjId {
    fn from(o: OpId) -> Self {
        if o == OpId::ROOT {
            ObjId::Root
        } else {
            ObjId::Id(o)
        }
    }
}

/// The id of an RGA list position: either the list head, or the id of the
/// operation (insert) that introduced the position.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ElemId {
    Head,
    Id(OpId),
}

impl fmt::Display for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemId::Head => write!(f, "_head"),
            ElemId::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<OpId> for ElemId {
    fn from(o: OpId) -> Self {
        ElemId::Id(o)
    }
}

/// The slot an operation targets within its object: a map key, or an RGA
/// position.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Key {
    Map(String),
    Seq(ElemId),
}

impl Key {
    pub fn elemid(&self) -> Option<ElemId> {
        match self {
            Key::Map(_) => None,
            Key::Seq(id) => Some(*id),
        }
    }

    pub fn as_map_key(&self) -> Option<&str> {
        match self {
            Key::Map(s) => Some(s.as_str()),
            Key::Seq(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Map(s) => write!(f, "{}", s),
            Key::Seq(id) => write!(f, "{}", id),
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Map(s)
    }
}

impl From<ElemId> for Key {
    fn from(e: ElemId) -> Self {
        Key::Seq(e)
    }
}

/// A user-facing handle on a property: a map key or a list index. Distinct
/// from [`Key`], which is the internal RGA-position-or-string form actually
/// stored on an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Map(String),
    Seq(usize),
}

impl From<&str> for Prop {
    fn from(p: &str) -> Self {
        Prop::Map(p.to_owned())
    }
}

impl From<String> for Prop {
    fn from(p: String) -> Self {
        Prop::Map(p)
    }
}

impl From<usize> for Prop {
    fn from(index: usize) -> Self {
        Prop::Seq(index)
    }
}

/// The kind of object a MAKE operation creates.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ObjType {
    Map,
    List,
}

impl fmt::Display for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjType::Map => write!(f, "map"),
            ObjType::List => write!(f, "list"),
        }
    }
}

/// The tagged action of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpType {
    Make(ObjType),
    Put(ScalarValue),
    Delete,
    Move { moved_id: OpId, move_src: ObjId },
}

impl OpType {
    pub fn is_make(&self) -> bool {
        matches!(self, OpType::Make(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OpType::Delete)
    }

    pub fn is_move(&self) -> bool {
        matches!(self, OpType::Move { .. })
    }
}

/// A single operation in an object's op log.
///
/// The move-induced validity bit is deliberately *not* a field here — it
/// lives solely in the move manager's `valid: HashMap<OpId, bool>` so
/// there is exactly one writer and no risk of the two copies disagreeing.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub obj: ObjId,
    pub key: Key,
    pub action: OpType,
    pub pred: Vec<OpId>,
    pub succ: Vec<OpId>,
    pub insert: bool,
}

impl Operation {
    pub fn overwrites(&self, other: &Operation) -> bool {
        self.pred.iter().any(|p| *p == other.id)
    }

    pub fn elemid(&self) -> Option<ElemId> {
        if self.insert {
            Some(ElemId::Id(self.id))
        } else {
            self.key.elemid()
        }
    }

    pub fn add_succ(&mut self, id: OpId) {
        if !self.succ.contains(&id) {
            self.succ.push(id);
        }
    }

    /// The value this op contributes to a read, ignoring validity/move
    /// decisions (those are resolved by the caller via the move manager).
    pub fn resolved_value(&self) -> ResolvedValue {
        match &self.action {
            OpType::Make(t) => ResolvedValue::Object(ObjId::Id(self.id), *t),
            OpType::Put(v) => ResolvedValue::Scalar(v.clone()),
            OpType::Delete => ResolvedValue::Scalar(ScalarValue::Null),
            OpType::Move { moved_id, .. } => ResolvedValue::Moved(*moved_id),
        }
    }
}

/// What a visible [`Operation`] resolves to for a reader. A `Moved` value
/// must be re-resolved by the caller: it names the *original* creating
/// operation of the carried value/object, which the caller looks up to
/// decide whether it is itself a scalar or an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Scalar(ScalarValue),
    Object(ObjId, ObjType),
    Moved(OpId),
}

/// Content hash of a [`Change`](crate::change::Change).
#[derive(Eq, PartialEq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct ChangeHash(pub [u8; 32]);

impl Serialize for ChangeHash {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ChangeHash {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChangeHash").field(&hex::encode(&self.0)).finish()
    }
}

impl fmt::Display for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseChangeHashError {
    #[error(transparent)]
    HexDecode(#[from] hex::FromHexError),
    #[error("incorrect length, change hash should be 32 bytes, got {actual}")]
    IncorrectLength { actual: usize },
}

impl FromStr for ChangeHash {
    type Err = ParseChangeHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() == 32 {
            Ok(ChangeHash(bytes.try_into().unwrap()))
        } else {
            Err(ParseChangeHashError::IncorrectLength { actual: bytes.len() })
        }
    }
}
