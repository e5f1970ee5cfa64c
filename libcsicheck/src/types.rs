//! Core data model: run arguments, claims, workloads, snapshots and the
//! request types handed to collaborators.
//!
//! These are plain values. The engine never keeps an object after the step
//! that created it hands its name on to the next step.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CheckError;

// ---------------------------------------------------------------------------
// Run arguments
// ---------------------------------------------------------------------------

/// Arguments for one snapshot/restore run. Immutable once the run starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRestoreArgs {
    /// Namespace that receives the claims, pods and snapshot.
    pub namespace: String,
    /// StorageClass under test.
    pub storage_class: String,
    /// VolumeSnapshotClass under test.
    pub volume_snapshot_class: String,
    /// UID the workload containers run as, if any.
    #[serde(default)]
    pub run_as_user: Option<i64>,
    /// Image for the workload containers. Must provide `sh`, `tail` and `sync`.
    pub container_image: String,
}

impl SnapshotRestoreArgs {
    /// Local precondition check; no remote call is made.
    pub fn validate(&self) -> Result<(), CheckError> {
        if self.namespace.is_empty()
            || self.storage_class.is_empty()
            || self.volume_snapshot_class.is_empty()
        {
            return Err(CheckError::InvalidArgument(
                "require namespace, storage class and volume snapshot class".to_owned(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cluster descriptors
// ---------------------------------------------------------------------------

/// The parts of a StorageClass the check needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageClassInfo {
    pub name: String,
    /// Driver identity, e.g. `"hostpath.csi.k8s.io"`.
    pub provisioner: String,
}

/// A VolumeSnapshotClass as returned by the cluster.
///
/// The object is kept untyped because the field holding the driver identity
/// changes between snapshot API versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeSnapshotClassInfo {
    pub name: String,
    /// Top-level fields of the object (everything except `metadata`).
    pub object: serde_json::Value,
}

impl VolumeSnapshotClassInfo {
    /// Read a top-level string field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.object.get(key).and_then(serde_json::Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Claims and workloads
// ---------------------------------------------------------------------------

/// Reference to the object a restored claim is populated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSource {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

/// Request to create a PersistentVolumeClaim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePvcArgs {
    pub generate_name: String,
    pub storage_class: String,
    pub namespace: String,
    #[serde(default)]
    pub data_source: Option<DataSource>,
    /// Requested capacity as a Kubernetes quantity, e.g. `"1Gi"`.
    #[serde(default)]
    pub restore_size: Option<String>,
}

/// Request to create a Pod bound to a claim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePodArgs {
    pub generate_name: String,
    pub pvc_name: String,
    pub namespace: String,
    /// Shell command run by the single container.
    pub cmd: String,
    #[serde(default)]
    pub run_as_user: Option<i64>,
    pub container_image: String,
}

/// A created PersistentVolumeClaim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeClaim {
    /// Server-assigned name.
    pub name: String,
    pub namespace: String,
    pub storage_class: String,
    #[serde(default)]
    pub data_source: Option<DataSource>,
    #[serde(default)]
    pub restore_size: Option<String>,
}

/// A created Pod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    /// Server-assigned name.
    pub name: String,
    pub namespace: String,
    pub cmd: String,
    #[serde(default)]
    pub run_as_user: Option<i64>,
    pub container_image: String,
    pub pvc_name: String,
}

/// A claim together with the workload bound to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub pvc: VolumeClaim,
    pub pod: Workload,
}

/// What exists after a failed application step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppResources {
    pub pvc: Option<VolumeClaim>,
    pub pod: Option<Workload>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Request to snapshot a claim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSnapshotArgs {
    pub namespace: String,
    pub pvc_name: String,
    pub volume_snapshot_class: String,
    /// Requested name; the server may assign a different one.
    pub snapshot_name: String,
}

/// Request to check that a snapshot can be the source of another snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateFromSourceCheckArgs {
    pub volume_snapshot_class: String,
    pub snapshot_name: String,
    pub namespace: String,
}

/// A created VolumeSnapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// Server-assigned name.
    pub name: String,
    pub namespace: String,
    pub source_pvc: String,
    pub volume_snapshot_class: String,
    /// Capacity a restored claim must request, once the driver reports it.
    #[serde(default)]
    pub restore_size: Option<String>,
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Payload and snapshot name threaded through one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunParams {
    /// String written by the original workload.
    pub payload: String,
    /// Requested VolumeSnapshot name.
    pub snapshot_name: String,
}

impl RunParams {
    /// Fresh, collision-free parameters for one run.
    pub fn generate() -> Self {
        use rand::Rng;
        use rand::distr::Alphanumeric;

        let payload: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self {
            payload,
            snapshot_name: format!("snapshot-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// Everything a run created, in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRestoreResults {
    pub original_pvc: Option<VolumeClaim>,
    pub original_pod: Option<Workload>,
    pub snapshot: Option<Snapshot>,
    pub cloned_pvc: Option<VolumeClaim>,
    pub cloned_pod: Option<Workload>,
}

impl SnapshotRestoreResults {
    /// `kind/name` of every created object, in creation order.
    pub fn created(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(pvc) = &self.original_pvc {
            out.push(format!("PersistentVolumeClaim/{}", pvc.name));
        }
        if let Some(pod) = &self.original_pod {
            out.push(format!("Pod/{}", pod.name));
        }
        if let Some(snap) = &self.snapshot {
            out.push(format!("VolumeSnapshot/{}", snap.name));
        }
        if let Some(pvc) = &self.cloned_pvc {
            out.push(format!("PersistentVolumeClaim/{}", pvc.name));
        }
        if let Some(pod) = &self.cloned_pod {
            out.push(format!("Pod/{}", pod.name));
        }
        out
    }
}

impl fmt::Display for SnapshotRestoreResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.created().join(", "))
    }
}
