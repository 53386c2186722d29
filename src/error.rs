use crate::types::TxId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the archive, snapshots and the reflection layer.
///
/// Programmer errors on numeric domains (a [`Vint`](crate::Vint) outside
/// `[-2^54, 2^54 - 1]`, a varint above `2^56 - 1`) panic instead of showing up
/// here; everything that can be caused by data or names does.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Persisted bytes could not be decoded: truncated stream, bad varint
    /// termination, out-of-range chain entry, checksum mismatch.
    #[error("malformed archive data: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("unknown field {entity}.{field}")]
    UnknownField { entity: String, field: String },

    #[error("type mismatch for {entity}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: String,
        found: String,
    },

    /// Set-valued relationships are populated with `insert` after creation.
    #[error("{entity}.{field} is set-valued and cannot be passed to the constructor")]
    SetFieldInConstructor { entity: String, field: String },

    #[error("missing value for {entity}.{field}")]
    MissingField { entity: String, field: String },

    #[error("{entity}.{field} is not set-valued")]
    NotASet { entity: String, field: String },

    #[error("{entity}.{field} is set-valued")]
    IsASet { entity: String, field: String },

    #[error("{entity} expects {expected} constructor values, found {found}")]
    Arity {
        entity: String,
        expected: usize,
        found: usize,
    },

    /// Transaction-log entities are written by commit alone.
    #[error("transaction log: {0}")]
    TransactionLog(String),

    #[error("transaction {0} has not been committed")]
    UnknownTransaction(TxId),

    #[error(
        "snapshot is stale: taken after {snapshot} transactions but the archive has {archive}"
    )]
    StaleSnapshot { snapshot: u32, archive: u32 },

    #[error("value {0} is outside the storable range")]
    OutOfRange(i64),

    #[error("another writer holds the lock on {}", .path.display())]
    Locked { path: PathBuf },
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}
