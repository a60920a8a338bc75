//! Errors reported by [`AvlMap`](crate::AvlMap).
//!
//! Every error is detected before the map is modified, so a failed call leaves the map exactly
//! as it was.

use thiserror::Error;

/// Errors that can occur during map operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An entry with the given key is already present.
    #[error("key already present")]
    DuplicateKey,

    /// No entry with the given key is present.
    #[error("key not found")]
    KeyNotFound,

    /// The arguments to a split or join did not satisfy its precondition.
    ///
    /// `split` requires the pivot key to be present. `join` requires every key of one map to be
    /// less than the separator key and every key of the other to be greater.
    #[error("precondition violated: {0}")]
    PreconditionViolated(&'static str),
}

/// A Result type alias using the crate's [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
