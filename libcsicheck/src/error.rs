//! Error types for the snapshot/restore check.
//!
//! Every failure the engine or a collaborator can report is a [`CheckError`].
//! It derives [`thiserror::Error`] and is [`Serialize`]/[`Deserialize`] so the
//! failure can be embedded verbatim in the JSON run report.
//!
//! Steps that create remote objects before failing return a [`Partial`]
//! carrying whatever was created, so the caller can inspect or clean it up.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the check engine and its collaborators.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Local argument check failed before any remote call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced namespace, class or object does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind, e.g. `"StorageClass"`.
        kind: String,
        /// Name that was looked up.
        name: String,
    },

    /// The snapshot class and the storage class name different drivers.
    #[error(
        "VolumeSnapshotClass {snapshot_class} driver {driver:?} does not match \
         StorageClass {storage_class} provisioner {provisioner:?}"
    )]
    DriverMismatch {
        storage_class: String,
        provisioner: String,
        snapshot_class: String,
        driver: String,
    },

    /// The snapshot API group reports a version the engine cannot speak.
    #[error("unsupported snapshot API version {0}")]
    UnsupportedVersion(String),

    /// A remote create / query call failed for a reason opaque to the engine.
    #[error("{op} failed: {reason}")]
    RemoteOperation {
        /// Operation (and check) that failed.
        op: String,
        /// Underlying failure, rendered.
        reason: String,
    },

    /// The workload exists but never became ready within the bound.
    #[error("pod {namespace}/{name} not ready: {reason}")]
    WorkloadNotReady {
        namespace: String,
        name: String,
        reason: String,
    },

    /// The snapshot exists but cannot serve as the source of a new snapshot.
    #[error("snapshot {name} failed create-from-source check: {reason}")]
    CreateFromSource { name: String, reason: String },

    /// The restored volume does not hold the payload written to the original.
    #[error("restored data mismatch: expected {expected:?}, found {found:?}")]
    DataMismatch { expected: String, found: String },

    /// The run was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl CheckError {
    /// Create a [`CheckError::RemoteOperation`] for `op` from anything that
    /// implements [`fmt::Display`].
    pub fn remote<E: fmt::Display>(op: impl Into<String>, e: E) -> Self {
        Self::RemoteOperation {
            op: op.into(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CheckError::NotFound`].
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Annotate a remote failure with the check or step that issued it.
    ///
    /// Only [`CheckError::RemoteOperation`] is rewritten; every other kind
    /// already names what failed.
    pub fn during(self, check: &str) -> Self {
        match self {
            Self::RemoteOperation { op, reason } => Self::RemoteOperation {
                op: format!("{check}: {op}"),
                reason,
            },
            other => other,
        }
    }
}

/// A failure that happened after some remote objects were already created.
///
/// `value` holds what exists remotely at the time of the failure; callers own
/// its cleanup.
#[derive(Debug, Clone)]
pub struct Partial<T, E = CheckError> {
    pub value: T,
    pub error: E,
}

impl<T, E> Partial<T, E> {
    pub fn new(value: T, error: E) -> Self {
        Self { value, error }
    }

    /// Transform the partial value, keeping the error.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U, E> {
        Partial {
            value: f(self.value),
            error: self.error,
        }
    }
}

impl<T, E: fmt::Display> fmt::Display for Partial<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<T, E> std::error::Error for Partial<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
