use thiserror::Error;

/// Failures a caller of the transaction/replica API must be prepared to
/// handle. Anything else indicates a programmer or data-integrity bug and
/// is reported as [`ReplicaError::Invariant`] instead of being retried.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ReplicaError {
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    #[error("list index out of range: {0}")]
    ListIndexOutOfRange(usize),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A programmer or data-integrity bug: unknown parent, missing
    /// lifecycle, an OpTree element of the wrong shape, and so on. Never
    /// retried locally.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl ReplicaError {
    pub(crate) fn invariant<S: Into<String>>(msg: S) -> Self {
        ReplicaError::Invariant(msg.into())
    }
}

#[derive(Error, Debug)]
#[error("invalid actor id: {0}")]
pub struct InvalidActorId(pub String);

pub type Result<T> = std::result::Result<T, ReplicaError>;
