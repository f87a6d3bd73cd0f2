//! Scalar values carried by PUT and scalar MOVE operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A leaf value a map or list slot can hold. Deliberately small relative to
/// Automerge's own `ScalarValue` (no `Cursor`/`Timestamp` variants), since
/// those wire concerns are out of scope here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Str(String),
    Int(i64),
    F64(f64),
    Counter(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Str(s) => write!(f, "{}", s),
            ScalarValue::Int(n) => write!(f, "{}", n),
            ScalarValue::F64(n) => write!(f, "{}", n),
            ScalarValue::Counter(n) => write!(f, "counter({})", n),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Bytes(b) => write!(f, "bytes({})", hex::encode(b)),
            ScalarValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Str(s.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::Str(s)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        ScalarValue::Int(n)
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::F64(n)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

/// What a transaction call accepts as a value: either a scalar (PUT) or a
/// request to create a nested object (MAKE).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    Object(crate::types::ObjType),
}

impl<T: Into<ScalarValue>> From<T> for Value {
    fn from(v: T) -> Self {
        Value::Scalar(v.into())
    }
}
