use std::io;
use std::path::Path as StdPath;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Represents all possible errors in the fanwalk crate.
///
/// Every variant except [`Error::InvalidArgument`] and
/// [`Error::InvalidPattern`] is local to one branch of a traversal and is
/// delivered through a callback rather than ending the walk.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub enum Error {
    /// The probed path does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// The path that could not be found.
        what: String,
    },

    /// The probed path exists but its metadata could not be read.
    #[error("Failed to inspect {what}: {how}")]
    Inaccessible {
        /// The path that could not be inspected.
        what: String,
        /// The reason for the failure.
        how: String,
    },

    /// Listing the children of a directory failed.
    #[error("Failed to list {what}: {how}")]
    ListDir {
        /// The directory that could not be listed.
        what: String,
        /// The reason for the failure.
        how: String,
    },

    /// Error indicating a failure to read file contents.
    #[error("Failed to read {what}: {how}")]
    Read {
        /// The item that failed to be read.
        what: String,
        /// The reason for the failure.
        how: String,
    },

    /// Error indicating an invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A path pattern failed to compile.
    #[error("Invalid pattern {what}: {how}")]
    InvalidPattern {
        /// The pattern source text.
        what: String,
        /// The reason for the failure.
        how: String,
    },

    /// A filesystem task panicked or was cancelled before reporting back.
    #[error("Sync failed {what}: {how}")]
    Sync {
        /// Specific failure type
        what: String,
        /// The potential  reason for the failure.
        how: String,
    },
}

impl Error {
    /// Classifies a metadata failure for `path`.
    pub(crate) fn probe(path: &StdPath, e: io::Error) -> Self {
        let what = path.to_string_lossy().to_string();
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFound { what }
        } else {
            Error::Inaccessible {
                what,
                how: e.to_string(),
            }
        }
    }

    /// The path (or pattern) the error is about, when there is one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Error::NotFound { what }
            | Error::Inaccessible { what, .. }
            | Error::ListDir { what, .. }
            | Error::Read { what, .. }
            | Error::InvalidPattern { what, .. } => Some(what),
            Error::InvalidArgument(_) | Error::Sync { .. } => None,
        }
    }
}
