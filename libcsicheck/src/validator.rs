//! Argument validation collaborator.
//!
//! Read-only lookups that gate a run before anything is created. The engine
//! decides the order and the driver comparison (see
//! [`SnapshotRestoreSteps::validate_args`](crate::steps::SnapshotRestoreSteps::validate_args));
//! implementations only answer "does it exist, and what does it say".

use async_trait::async_trait;

use crate::error::CheckError;
use crate::types::{StorageClassInfo, VolumeSnapshotClassInfo};
use crate::version::GroupVersion;

/// Existence and field lookups for the objects named in the run arguments.
///
/// A missing object is reported as [`CheckError::NotFound`]; any other
/// failure as [`CheckError::RemoteOperation`].
#[async_trait]
pub trait ArgumentValidator: Send + Sync {
    /// Confirm the namespace exists.
    async fn validate_namespace(&self, namespace: &str) -> Result<(), CheckError>;

    /// Fetch the storage class and its provisioner.
    async fn validate_storage_class(&self, name: &str) -> Result<StorageClassInfo, CheckError>;

    /// Fetch the snapshot class through the API version `group_version`.
    async fn validate_volume_snapshot_class(
        &self,
        name: &str,
        group_version: &GroupVersion,
    ) -> Result<VolumeSnapshotClassInfo, CheckError>;
}
