//! Scripted in-memory cluster for unit tests.
//!
//! [`FakeCluster`] implements every collaborator trait, records each call in
//! order, and answers from fields that a test overrides before use. Names are
//! assigned the way the API server does it: `generate_name` plus a counter.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::app::ApplicationCreator;
use crate::data::DataReader;
use crate::error::CheckError;
use crate::snapshot::{SnapshotCreator, SnapshotHandle};
use crate::types::*;
use crate::validator::ArgumentValidator;
use crate::version::{
    ALPHA_VERSION, ApiVersionFetcher, GroupVersion, VOL_SNAP_CLASS_ALPHA_DRIVER_KEY,
};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ValidateNamespace(String),
    ValidateStorageClass(String),
    GetGroupVersion,
    ValidateVolumeSnapshotClass(String, GroupVersion),
    CreatePvc(CreatePvcArgs),
    CreatePod(CreatePodArgs),
    IsPodReady(String, String),
    NewSnapshotter(GroupVersion),
    CreateSnapshot(CreateSnapshotArgs),
    CreateFromSourceCheck(CreateFromSourceCheckArgs),
    ReadData(String, String),
}

pub struct FakeCluster {
    pub(crate) calls: Mutex<Vec<Call>>,
    pub(crate) counter: Mutex<u32>,

    pub namespace: Result<(), CheckError>,
    pub storage_class: Result<StorageClassInfo, CheckError>,
    pub group_version: Result<GroupVersion, CheckError>,
    pub snapshot_class: Result<VolumeSnapshotClassInfo, CheckError>,

    /// Fail the n-th (0-based) `create_pvc` call.
    pub fail_pvc: Option<(usize, CheckError)>,
    /// Fail the n-th (0-based) `create_pod` call.
    pub fail_pod: Option<(usize, CheckError)>,
    /// Probes answering "not ready" before a pod reports ready.
    pub ready_after: u32,
    /// Error returned by every readiness probe.
    pub ready_error: Option<CheckError>,

    pub snapshotter_error: Option<CheckError>,
    pub snapshot_error: Option<CheckError>,
    /// Hold `create_snapshot` until the run's token fires, like a snapshot
    /// that never becomes ready to use.
    pub snapshot_never_ready: bool,
    /// Server-assigned snapshot name; `None` keeps the requested one.
    pub snapshot_assigned_name: Option<String>,
    pub restore_size: Option<String>,
    pub cfs_error: Option<CheckError>,

    pub data: Result<String, CheckError>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
            namespace: Ok(()),
            storage_class: Ok(StorageClassInfo {
                name: "sc".into(),
                provisioner: "p1".into(),
            }),
            group_version: Ok(GroupVersion::parse(ALPHA_VERSION).expect("alpha version")),
            snapshot_class: Ok(VolumeSnapshotClassInfo {
                name: "vsc".into(),
                object: serde_json::json!({ VOL_SNAP_CLASS_ALPHA_DRIVER_KEY: "p1" }),
            }),
            fail_pvc: None,
            fail_pod: None,
            ready_after: 0,
            ready_error: None,
            snapshotter_error: None,
            snapshot_error: None,
            snapshot_never_ready: false,
            snapshot_assigned_name: None,
            restore_size: Some("1Gi".into()),
            cfs_error: None,
            data: Ok("some string\n".into()),
        }
    }
}

impl FakeCluster {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().expect("calls lock").iter().filter(|c| pred(*c)).count()
    }

    fn next_id(&self) -> u32 {
        let mut counter = self.counter.lock().expect("counter lock");
        *counter += 1;
        *counter
    }

    fn failure(&self, plan: &Option<(usize, CheckError)>, seen: usize) -> Option<CheckError> {
        match plan {
            Some((n, e)) if *n == seen => Some(e.clone()),
            _ => None,
        }
    }
}

pub fn args() -> SnapshotRestoreArgs {
    SnapshotRestoreArgs {
        namespace: "ns".into(),
        storage_class: "sc".into(),
        volume_snapshot_class: "vsc".into(),
        run_as_user: Some(100),
        container_image: "image".into(),
    }
}

#[async_trait]
impl ArgumentValidator for FakeCluster {
    async fn validate_namespace(&self, namespace: &str) -> Result<(), CheckError> {
        self.record(Call::ValidateNamespace(namespace.to_owned()));
        self.namespace.clone()
    }

    async fn validate_storage_class(&self, name: &str) -> Result<StorageClassInfo, CheckError> {
        self.record(Call::ValidateStorageClass(name.to_owned()));
        self.storage_class.clone()
    }

    async fn validate_volume_snapshot_class(
        &self,
        name: &str,
        group_version: &GroupVersion,
    ) -> Result<VolumeSnapshotClassInfo, CheckError> {
        self.record(Call::ValidateVolumeSnapshotClass(
            name.to_owned(),
            group_version.clone(),
        ));
        self.snapshot_class.clone()
    }
}

#[async_trait]
impl ApiVersionFetcher for FakeCluster {
    async fn get_csi_snapshot_group_version(&self) -> Result<GroupVersion, CheckError> {
        self.record(Call::GetGroupVersion);
        self.group_version.clone()
    }
}

#[async_trait]
impl ApplicationCreator for FakeCluster {
    async fn create_pvc(&self, args: &CreatePvcArgs) -> Result<VolumeClaim, CheckError> {
        let seen = self.count(|c| matches!(c, Call::CreatePvc(_)));
        self.record(Call::CreatePvc(args.clone()));
        if let Some(e) = self.failure(&self.fail_pvc, seen) {
            return Err(e);
        }
        Ok(VolumeClaim {
            name: format!("{}{}", args.generate_name, self.next_id()),
            namespace: args.namespace.clone(),
            storage_class: args.storage_class.clone(),
            data_source: args.data_source.clone(),
            restore_size: args.restore_size.clone(),
        })
    }

    async fn create_pod(&self, args: &CreatePodArgs) -> Result<Workload, CheckError> {
        let seen = self.count(|c| matches!(c, Call::CreatePod(_)));
        self.record(Call::CreatePod(args.clone()));
        if let Some(e) = self.failure(&self.fail_pod, seen) {
            return Err(e);
        }
        Ok(Workload {
            name: format!("{}{}", args.generate_name, self.next_id()),
            namespace: args.namespace.clone(),
            cmd: args.cmd.clone(),
            run_as_user: args.run_as_user,
            container_image: args.container_image.clone(),
            pvc_name: args.pvc_name.clone(),
        })
    }

    async fn is_pod_ready(&self, namespace: &str, name: &str) -> Result<bool, CheckError> {
        let probes = self.count(|c| matches!(c, Call::IsPodReady(_, n) if n == name));
        self.record(Call::IsPodReady(namespace.to_owned(), name.to_owned()));
        if let Some(e) = &self.ready_error {
            return Err(e.clone());
        }
        Ok(probes as u32 >= self.ready_after)
    }
}

#[async_trait]
impl SnapshotCreator for FakeCluster {
    async fn new_snapshotter(
        &self,
        group_version: &GroupVersion,
    ) -> Result<SnapshotHandle, CheckError> {
        self.record(Call::NewSnapshotter(group_version.clone()));
        if let Some(e) = &self.snapshotter_error {
            return Err(e.clone());
        }
        SnapshotHandle::new(group_version.clone())
    }

    async fn create_snapshot(
        &self,
        _handle: &SnapshotHandle,
        args: &CreateSnapshotArgs,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, CheckError> {
        self.record(Call::CreateSnapshot(args.clone()));
        if let Some(e) = &self.snapshot_error {
            return Err(e.clone());
        }
        if self.snapshot_never_ready {
            cancel.cancelled().await;
            return Err(CheckError::Cancelled);
        }
        Ok(Snapshot {
            name: self
                .snapshot_assigned_name
                .clone()
                .unwrap_or_else(|| args.snapshot_name.clone()),
            namespace: args.namespace.clone(),
            source_pvc: args.pvc_name.clone(),
            volume_snapshot_class: args.volume_snapshot_class.clone(),
            restore_size: self.restore_size.clone(),
        })
    }

    async fn create_from_source_check(
        &self,
        _handle: &SnapshotHandle,
        args: &CreateFromSourceCheckArgs,
        _cancel: &CancellationToken,
    ) -> Result<(), CheckError> {
        self.record(Call::CreateFromSourceCheck(args.clone()));
        match &self.cfs_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataReader for FakeCluster {
    async fn read_data(&self, namespace: &str, pod: &str) -> Result<String, CheckError> {
        self.record(Call::ReadData(namespace.to_owned(), pod.to_owned()));
        self.data.clone()
    }
}
