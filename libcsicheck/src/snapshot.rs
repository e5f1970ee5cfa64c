//! Snapshot collaborator.
//!
//! A [`SnapshotHandle`] is the access path to the snapshot API for one
//! resolved version. It is obtained once per run and passed to every snapshot
//! call so creation and the create-from-source check speak the same version.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CheckError;
use crate::types::{CreateFromSourceCheckArgs, CreateSnapshotArgs, Snapshot};
use crate::version::{GroupVersion, ProtocolVersion};

/// Kind used in a restored claim's `dataSource`.
pub const VOLUME_SNAPSHOT_KIND: &str = "VolumeSnapshot";

/// Version-bound access to the snapshot API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    group_version: GroupVersion,
    protocol: ProtocolVersion,
}

impl SnapshotHandle {
    /// Bind a handle to `group_version`; fails for versions the engine cannot
    /// speak.
    pub fn new(group_version: GroupVersion) -> Result<Self, CheckError> {
        let protocol = group_version.protocol()?;
        Ok(Self {
            group_version,
            protocol,
        })
    }

    pub fn group_version(&self) -> &GroupVersion {
        &self.group_version
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }
}

/// Creates snapshots and checks they are usable as a restore source.
#[async_trait]
pub trait SnapshotCreator: Send + Sync {
    /// Obtain a handle for `group_version`.
    async fn new_snapshotter(
        &self,
        group_version: &GroupVersion,
    ) -> Result<SnapshotHandle, CheckError>;

    /// Snapshot `args.pvc_name` and wait until the snapshot is ready to use.
    /// The returned name is the one the server assigned. The wait ends with
    /// [`CheckError::Cancelled`] once `cancel` fires.
    async fn create_snapshot(
        &self,
        handle: &SnapshotHandle,
        args: &CreateSnapshotArgs,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, CheckError>;

    /// Prove `args.snapshot_name` can seed a new snapshot, removing whatever
    /// the check itself created.
    async fn create_from_source_check(
        &self,
        handle: &SnapshotHandle,
        args: &CreateFromSourceCheckArgs,
        cancel: &CancellationToken,
    ) -> Result<(), CheckError>;
}
