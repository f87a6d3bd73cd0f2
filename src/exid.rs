//! External OpId form: carries the full actor UUID so two replicas
//! needn't agree on local index assignments. This is also the form a
//! [`crate::change::Change`] serializes operations in.

use crate::types::ActorId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ExId {
    Root,
    Id(u64, ActorId),
}

impl fmt::Display for ExId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExId::Root => write!(f, "_root"),
            ExId::Id(ctr, actor) => write!(f, "{}@{}", ctr, actor),
        }
    }
}

impl Ord for ExId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ExId::Root, ExId::Root) => Ordering::Equal,
            (ExId::Root, _) => Ordering::Less,
            (_, ExId::Root) => Ordering::Greater,
            (ExId::Id(c1, a1), ExId::Id(c2, a2)) if c1 == c2 => a1.cmp(a2),
            (ExId::Id(c1, _), ExId::Id(c2, _)) => c1.cmp(c2),
        }
    }
}

impl PartialOrd for ExId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(thiserror::Error, Debug)]
#[error("invalid external id: {0}")]
pub struct ParseExIdError(pub String);

impl FromStr for ExId {
    type Err = ParseExIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "_root" {
            return Ok(ExId::Root);
        }
        let (counter, actor) = s.split_once('@').ok_or_else(|| ParseExIdError(s.to_owned()))?;
        let counter: u64 = counter.parse().map_err(|_| ParseExIdError(s.to_owned()))?;
        let actor = ActorId::try_from(actor).map_err(|_| ParseExIdError(s.to_owned()))?;
        Ok(ExId::Id(counter, actor))
    }
}

impl Serialize for ExId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
