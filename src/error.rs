//! Error types for the store.
//!
//! One enum covers every failure kind from validation, streaming, the
//! reference graph, and the filesystem. Variants map directly onto the
//! error kinds named by the design: nothing here is invented beyond the
//! names already used elsewhere in this crate.

use std::path::PathBuf;

/// Errors produced by any `hashstore` operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Caller-supplied argument is null/empty/malformed (bad pid, size, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named algorithm is not one of the eight supported digest algorithms.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Requested pid or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Destination file already present where a fresh create was expected.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Pid is already tagged to a different cid than the one requested.
    #[error("pid already tagged to a different cid")]
    PidAlreadyTagged,

    /// A pid-refs file exists and names a different cid than the one supplied.
    #[error("pid-refs file exists for a different cid")]
    PidRefsFileExists,

    /// Stream produced fewer or more bytes than `expected_size`.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Size the caller asserted in advance.
        expected: u64,
        /// Size actually observed on the wire.
        actual: u64,
    },

    /// Client-supplied checksum did not match the computed digest.
    #[error("checksum mismatch for algorithm {algorithm}")]
    ChecksumMismatch {
        /// Algorithm the mismatch was evaluated under.
        algorithm: String,
    },

    /// Stream produced zero bytes while a positive size was requested.
    #[error("empty stream, expected a positive-size payload")]
    EmptyStream,

    /// A pid-refs file exists whose cid has no object and no cid-refs file.
    #[error("orphan pid-refs for pid {0:?}")]
    OrphanPidRefs(String),

    /// Cid-refs exists (or should) but the referenced object file is missing.
    #[error("orphan refs: object file missing for cid {0}")]
    OrphanRefs(String),

    /// Cid-refs exists but does not list the expected pid.
    #[error("pid not present in cid-refs")]
    PidNotInCidRefs,

    /// Pid-refs content does not match the expected cid.
    #[error("cid mismatch: pid-refs names a different cid")]
    CidMismatch,

    /// A per-identifier lock was contended and the table is configured to
    /// fail fast rather than block.
    #[error("lock contended for key {0:?}")]
    Contended(String),

    /// Config document is missing, malformed, or disagrees with the caller's
    /// requested layout parameters.
    #[error("config error: {0}")]
    Config(String),

    /// Underlying filesystem error.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of the config document failed.
    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
