//! Kubernetes backend.
//!
//! [`KubeCluster`] implements every collaborator trait against a live API
//! server through `kube`. Core objects (namespaces, classes, claims, pods) are
//! typed with `k8s-openapi`; snapshot objects are [`DynamicObject`]s bound to
//! the discovered snapshot API version, because their layout differs between
//! the alpha and the stable generations.
//!
//! # Create-from-source check
//!
//! ```text
//! VolumeSnapshot (source) ──> VolumeSnapshotContent ──> snapshotHandle, driver
//!                                                          │
//! VolumeSnapshotClass clone (Retain) ◄─────────────────────┤
//! VolumeSnapshotContent clone (pre-bound to the handle) ◄──┘
//!   └─> VolumeSnapshot clone  ──wait readyToUse──> delete clones
//! ```

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Pod, PodSecurityContext, PodSpec,
    TypedLocalObjectReference, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, ApiResource, AttachParams, DeleteParams, DynamicObject, GroupVersionKind, PostParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::app::{ApplicationCreator, DATA_FILE_PATH, DATA_MOUNT_PATH};
use crate::data::DataReader;
use crate::error::CheckError;
use crate::snapshot::{SnapshotCreator, SnapshotHandle, VOLUME_SNAPSHOT_KIND};
use crate::types::*;
use crate::validator::ArgumentValidator;
use crate::version::{ApiVersionFetcher, GroupVersion, ProtocolVersion, SNAPSHOT_API_GROUP};
use crate::wait::{PollError, WaitPolicy, poll_until};

/// Capacity requested by a claim that is not restored from a snapshot.
const DEFAULT_PVC_SIZE: &str = "1Gi";

/// Name prefix of the objects created by the create-from-source check.
const CLONE_PREFIX: &str = "csi-check-clone-";

/// Volume name of the claim inside the workload pod.
const VOLUME_NAME: &str = "persistent-storage";

const CONTAINER_NAME: &str = "csi-check";

/// Collaborator implementation backed by a Kubernetes API server.
///
/// Snapshot readiness waits observe the token passed with each call.
pub struct KubeCluster {
    client: Client,
    /// Bound on snapshot readiness waits.
    wait: WaitPolicy,
}

impl KubeCluster {
    pub fn new(client: Client, wait: WaitPolicy) -> Self {
        Self { client, wait }
    }

    /// Connect with the ambient kubeconfig or in-cluster configuration.
    pub async fn try_default(wait: WaitPolicy) -> Result<Self, CheckError> {
        let client = Client::try_default()
            .await
            .map_err(|e| CheckError::remote("load kube config", e))?;
        Ok(Self::new(client, wait))
    }

    fn snapshot_resource(gv: &GroupVersion, kind: &str, plural: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&gv.group, &gv.version, kind),
            plural,
        )
    }

    fn snapshot_api(&self, gv: &GroupVersion, namespace: &str) -> (Api<DynamicObject>, ApiResource) {
        let ar = Self::snapshot_resource(gv, VOLUME_SNAPSHOT_KIND, "volumesnapshots");
        (
            Api::namespaced_with(self.client.clone(), namespace, &ar),
            ar,
        )
    }

    fn content_api(&self, gv: &GroupVersion) -> (Api<DynamicObject>, ApiResource) {
        let ar = Self::snapshot_resource(gv, "VolumeSnapshotContent", "volumesnapshotcontents");
        (Api::all_with(self.client.clone(), &ar), ar)
    }

    fn class_api(&self, gv: &GroupVersion) -> (Api<DynamicObject>, ApiResource) {
        let ar = Self::snapshot_resource(gv, "VolumeSnapshotClass", "volumesnapshotclasses");
        (Api::all_with(self.client.clone(), &ar), ar)
    }

    /// Poll a snapshot until `status.readyToUse` is true.
    async fn wait_snapshot_ready(
        &self,
        api: &Api<DynamicObject>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<DynamicObject, CheckError> {
        poll_until(self.wait, cancel, move || async move {
            let snap = api
                .get(name)
                .await
                .map_err(|e| kube_err("get", VOLUME_SNAPSHOT_KIND, name, e))?;
            if let Some(msg) = snap.data.pointer("/status/error/message").and_then(Value::as_str) {
                debug!(name, error = msg, "snapshot reports error");
            }
            Ok(snap.data.pointer("/status/readyToUse") == Some(&Value::Bool(true)))
        })
        .await
        .map_err(|e| match e {
            PollError::Cancelled => CheckError::Cancelled,
            PollError::Failed(e) => e,
            timeout => CheckError::remote(format!("wait for VolumeSnapshot {name}"), timeout),
        })?;

        api.get(name)
            .await
            .map_err(|e| kube_err("get", VOLUME_SNAPSHOT_KIND, name, e))
    }

    /// Read the snapshot handle and driver behind `source`.
    async fn snapshot_source(
        &self,
        handle: &SnapshotHandle,
        namespace: &str,
        source: &str,
    ) -> Result<(String, String), CheckError> {
        let (snap_api, _) = self.snapshot_api(handle.group_version(), namespace);
        let snap = snap_api
            .get(source)
            .await
            .map_err(|e| kube_err("get", VOLUME_SNAPSHOT_KIND, source, e))?;

        let ptrs = SourcePointers::of(handle.protocol());

        let content_name = string_at(&snap.data, ptrs.content_name).ok_or_else(|| {
            CheckError::remote(
                format!("resolve content of VolumeSnapshot {source}"),
                "snapshot is not bound to a VolumeSnapshotContent",
            )
        })?;
        let (content_api, _) = self.content_api(handle.group_version());
        let content = content_api
            .get(&content_name)
            .await
            .map_err(|e| kube_err("get", "VolumeSnapshotContent", &content_name, e))?;

        let missing = |field: &str| {
            CheckError::remote(
                format!("read VolumeSnapshotContent {content_name}"),
                format!("{field} is not set"),
            )
        };
        let snapshot_handle =
            string_at(&content.data, ptrs.snapshot_handle).ok_or_else(|| missing("snapshotHandle"))?;
        let driver = string_at(&content.data, ptrs.driver).ok_or_else(|| missing("driver"))?;
        Ok((snapshot_handle, driver))
    }

    /// Create the clone class, content and snapshot, and wait for the clone.
    /// Each object is recorded in `clones` as soon as the server accepts it.
    async fn create_from_source(
        &self,
        handle: &SnapshotHandle,
        args: &CreateFromSourceCheckArgs,
        clones: &mut CloneSet,
        cancel: &CancellationToken,
    ) -> Result<(), CheckError> {
        let gv = handle.group_version();
        let protocol = handle.protocol();
        let pp = PostParams::default();

        let (snapshot_handle, driver) = self
            .snapshot_source(handle, &args.namespace, &args.snapshot_name)
            .await?;

        // Retain, so deleting the clone never removes the driver-side snapshot.
        let (class_api, class_ar) = self.class_api(gv);
        let class = class_api
            .get(&args.volume_snapshot_class)
            .await
            .map_err(|e| kube_err("get", "VolumeSnapshotClass", &args.volume_snapshot_class, e))?;
        let mut class_data = class.data;
        class_data["deletionPolicy"] = json!("Retain");
        let class_clone = DynamicObject::new(&clones.class, &class_ar).data(class_data);
        class_api
            .create(&pp, &class_clone)
            .await
            .map_err(|e| kube_err("create", "VolumeSnapshotClass", &clones.class, e))?;
        clones.class_created = true;

        let content_spec = clone_content_spec(
            protocol,
            &driver,
            &snapshot_handle,
            &clones.class,
            &clones.snapshot,
            &args.namespace,
        );
        let (content_api, content_ar) = self.content_api(gv);
        let content = DynamicObject::new(&clones.content, &content_ar)
            .data(json!({ "spec": content_spec }));
        content_api
            .create(&pp, &content)
            .await
            .map_err(|e| kube_err("create", "VolumeSnapshotContent", &clones.content, e))?;
        clones.content_created = true;

        let snapshot_spec = clone_snapshot_spec(protocol, &clones.class, &clones.content);
        let (snap_api, snap_ar) = self.snapshot_api(gv, &args.namespace);
        let snapshot = DynamicObject::new(&clones.snapshot, &snap_ar)
            .within(&args.namespace)
            .data(json!({ "spec": snapshot_spec }));
        snap_api
            .create(&pp, &snapshot)
            .await
            .map_err(|e| kube_err("create", VOLUME_SNAPSHOT_KIND, &clones.snapshot, e))?;
        clones.snapshot_created = true;

        self.wait_snapshot_ready(&snap_api, &clones.snapshot, cancel)
            .await?;
        Ok(())
    }

    /// Delete the clone objects that were actually created, newest first.
    async fn remove_clones(&self, gv: &GroupVersion, namespace: &str, clones: &CloneSet) {
        if clones.snapshot_created {
            let (api, _) = self.snapshot_api(gv, namespace);
            delete_quietly(&api, VOLUME_SNAPSHOT_KIND, &clones.snapshot).await;
        }
        if clones.content_created {
            let (api, _) = self.content_api(gv);
            delete_quietly(&api, "VolumeSnapshotContent", &clones.content).await;
        }
        if clones.class_created {
            let (api, _) = self.class_api(gv);
            delete_quietly(&api, "VolumeSnapshotClass", &clones.class).await;
        }
    }

    /// Delete everything a run created, newest first. Failures are logged and
    /// otherwise ignored.
    pub async fn cleanup(&self, results: &SnapshotRestoreResults) {
        for pod in [&results.cloned_pod, &results.original_pod].into_iter().flatten() {
            let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
            delete_quietly(&api, "Pod", &pod.name).await;
        }
        for pvc in [&results.cloned_pvc, &results.original_pvc].into_iter().flatten() {
            let api: Api<PersistentVolumeClaim> =
                Api::namespaced(self.client.clone(), &pvc.namespace);
            delete_quietly(&api, "PersistentVolumeClaim", &pvc.name).await;
        }
        if let Some(snap) = &results.snapshot {
            match self.get_csi_snapshot_group_version().await {
                Ok(gv) => {
                    let (api, _) = self.snapshot_api(&gv, &snap.namespace);
                    delete_quietly(&api, VOLUME_SNAPSHOT_KIND, &snap.name).await;
                }
                Err(e) => warn!(name = %snap.name, error = %e, "cannot delete snapshot"),
            }
        }
        info!("cleanup complete");
    }
}

fn kube_err(op: &str, kind: &str, name: &str, err: kube::Error) -> CheckError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => CheckError::not_found(kind, name),
        other => CheckError::remote(format!("{op} {kind} {name}"), other),
    }
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Claim capacity: the snapshot's restore size when it is set and non-zero.
fn requested_size(restore_size: Option<&str>) -> String {
    let is_zero = |q: &str| {
        q.chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .all(|c| c == '0' || c == '.')
    };
    match restore_size.map(str::trim) {
        Some(q) if !is_zero(q) => q.to_owned(),
        _ => DEFAULT_PVC_SIZE.to_owned(),
    }
}

async fn delete_quietly<K>(api: &Api<K>, kind: &str, name: &str)
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => debug!(kind, name, "deleted"),
        Err(kube::Error::Api(resp)) if resp.code == 404 => {}
        Err(e) => warn!(kind, name, error = %e, "delete failed"),
    }
}

// ---------------------------------------------------------------------------
// Snapshot object layouts
// ---------------------------------------------------------------------------

/// JSON pointers locating the bound content of a snapshot, and the driver
/// handle and driver name on that content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourcePointers {
    /// On the VolumeSnapshot.
    content_name: &'static str,
    /// On the VolumeSnapshotContent.
    snapshot_handle: &'static str,
    /// On the VolumeSnapshotContent.
    driver: &'static str,
}

impl SourcePointers {
    const fn of(protocol: ProtocolVersion) -> Self {
        match protocol {
            ProtocolVersion::Alpha => Self {
                content_name: "/spec/snapshotContentName",
                snapshot_handle: "/spec/csiVolumeSnapshotSource/snapshotHandle",
                driver: "/spec/csiVolumeSnapshotSource/driver",
            },
            ProtocolVersion::Stable => Self {
                content_name: "/status/boundVolumeSnapshotContentName",
                snapshot_handle: "/status/snapshotHandle",
                driver: "/spec/driver",
            },
        }
    }
}

/// `spec` of a VolumeSnapshot taken from a claim.
fn snapshot_spec(protocol: ProtocolVersion, class: &str, pvc: &str) -> Value {
    match protocol {
        ProtocolVersion::Alpha => json!({
            "snapshotClassName": class,
            "source": { "kind": "PersistentVolumeClaim", "name": pvc },
        }),
        ProtocolVersion::Stable => json!({
            "volumeSnapshotClassName": class,
            "source": { "persistentVolumeClaimName": pvc },
        }),
    }
}

/// `spec` of a VolumeSnapshotContent pre-bound to an existing driver
/// snapshot and to the VolumeSnapshot `snapshot` in `namespace`.
fn clone_content_spec(
    protocol: ProtocolVersion,
    driver: &str,
    snapshot_handle: &str,
    class: &str,
    snapshot: &str,
    namespace: &str,
) -> Value {
    let snapshot_ref = json!({
        "kind": VOLUME_SNAPSHOT_KIND,
        "name": snapshot,
        "namespace": namespace,
    });
    match protocol {
        ProtocolVersion::Alpha => json!({
            "deletionPolicy": "Retain",
            "csiVolumeSnapshotSource": {
                "driver": driver,
                "snapshotHandle": snapshot_handle,
            },
            "snapshotClassName": class,
            "volumeSnapshotRef": snapshot_ref,
        }),
        ProtocolVersion::Stable => json!({
            "deletionPolicy": "Retain",
            "driver": driver,
            "source": { "snapshotHandle": snapshot_handle },
            "volumeSnapshotClassName": class,
            "volumeSnapshotRef": snapshot_ref,
        }),
    }
}

/// `spec` of a VolumeSnapshot bound to the pre-provisioned `content`.
fn clone_snapshot_spec(protocol: ProtocolVersion, class: &str, content: &str) -> Value {
    match protocol {
        ProtocolVersion::Alpha => json!({
            "snapshotClassName": class,
            "snapshotContentName": content,
        }),
        ProtocolVersion::Stable => json!({
            "volumeSnapshotClassName": class,
            "source": { "volumeSnapshotContentName": content },
        }),
    }
}

/// Objects of one create-from-source check. Names share a per-check suffix so
/// concurrent checks against the same class never touch each other's clones.
#[derive(Debug)]
struct CloneSet {
    class: String,
    content: String,
    snapshot: String,
    class_created: bool,
    content_created: bool,
    snapshot_created: bool,
}

impl CloneSet {
    fn new(suffix: &str) -> Self {
        Self {
            class: format!("{CLONE_PREFIX}class-{suffix}"),
            content: format!("{CLONE_PREFIX}content-{suffix}"),
            snapshot: format!("{CLONE_PREFIX}{suffix}"),
            class_created: false,
            content_created: false,
            snapshot_created: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ArgumentValidator
// ---------------------------------------------------------------------------

#[async_trait]
impl ArgumentValidator for KubeCluster {
    #[instrument(skip(self))]
    async fn validate_namespace(&self, namespace: &str) -> Result<(), CheckError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(namespace)
            .await
            .map(|_| ())
            .map_err(|e| kube_err("get", "Namespace", namespace, e))
    }

    #[instrument(skip(self))]
    async fn validate_storage_class(&self, name: &str) -> Result<StorageClassInfo, CheckError> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        let sc = api
            .get(name)
            .await
            .map_err(|e| kube_err("get", "StorageClass", name, e))?;
        Ok(StorageClassInfo {
            name: name.to_owned(),
            provisioner: sc.provisioner,
        })
    }

    #[instrument(skip(self, group_version), fields(%group_version))]
    async fn validate_volume_snapshot_class(
        &self,
        name: &str,
        group_version: &GroupVersion,
    ) -> Result<VolumeSnapshotClassInfo, CheckError> {
        let (api, _) = self.class_api(group_version);
        let vsc = api
            .get(name)
            .await
            .map_err(|e| kube_err("get", "VolumeSnapshotClass", name, e))?;
        Ok(VolumeSnapshotClassInfo {
            name: name.to_owned(),
            object: vsc.data,
        })
    }
}

// ---------------------------------------------------------------------------
// ApiVersionFetcher
// ---------------------------------------------------------------------------

#[async_trait]
impl ApiVersionFetcher for KubeCluster {
    async fn get_csi_snapshot_group_version(&self) -> Result<GroupVersion, CheckError> {
        let groups = self
            .client
            .list_api_groups()
            .await
            .map_err(|e| CheckError::remote("list API groups", e))?;
        let group = groups
            .groups
            .into_iter()
            .find(|g| g.name == SNAPSHOT_API_GROUP)
            .ok_or_else(|| CheckError::not_found("API group", SNAPSHOT_API_GROUP))?;
        let preferred = group
            .preferred_version
            .or_else(|| group.versions.into_iter().next())
            .ok_or_else(|| CheckError::not_found("API version of", SNAPSHOT_API_GROUP))?;
        debug!(group_version = %preferred.group_version, "snapshot API discovered");
        GroupVersion::parse(&preferred.group_version)
    }
}

// ---------------------------------------------------------------------------
// ApplicationCreator
// ---------------------------------------------------------------------------

#[async_trait]
impl ApplicationCreator for KubeCluster {
    #[instrument(skip(self, args), fields(generate_name = %args.generate_name))]
    async fn create_pvc(&self, args: &CreatePvcArgs) -> Result<VolumeClaim, CheckError> {
        let size = requested_size(args.restore_size.as_deref());
        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                generate_name: Some(args.generate_name.clone()),
                namespace: Some(args.namespace.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
                storage_class_name: Some(args.storage_class.clone()),
                data_source: args.data_source.as_ref().map(|ds| TypedLocalObjectReference {
                    api_group: Some(ds.api_group.clone()),
                    kind: ds.kind.clone(),
                    name: ds.name.clone(),
                }),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), Quantity(size))])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &args.namespace);
        let created = api
            .create(&PostParams::default(), &pvc)
            .await
            .map_err(|e| kube_err("create", "PersistentVolumeClaim", &args.generate_name, e))?;
        let name = created.name_any();
        info!(%name, "PersistentVolumeClaim created");

        Ok(VolumeClaim {
            name,
            namespace: args.namespace.clone(),
            storage_class: args.storage_class.clone(),
            data_source: args.data_source.clone(),
            restore_size: args.restore_size.clone(),
        })
    }

    #[instrument(skip(self, args), fields(generate_name = %args.generate_name, pvc = %args.pvc_name))]
    async fn create_pod(&self, args: &CreatePodArgs) -> Result<Workload, CheckError> {
        let pod = Pod {
            metadata: ObjectMeta {
                generate_name: Some(args.generate_name.clone()),
                namespace: Some(args.namespace.clone()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: CONTAINER_NAME.to_owned(),
                    image: Some(args.container_image.clone()),
                    command: Some(vec!["/bin/sh".to_owned(), "-c".to_owned(), args.cmd.clone()]),
                    volume_mounts: Some(vec![VolumeMount {
                        name: VOLUME_NAME.to_owned(),
                        mount_path: DATA_MOUNT_PATH.to_owned(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: VOLUME_NAME.to_owned(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: args.pvc_name.clone(),
                        read_only: None,
                    }),
                    ..Default::default()
                }]),
                security_context: args.run_as_user.map(|uid| PodSecurityContext {
                    run_as_user: Some(uid),
                    fs_group: Some(uid),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &args.namespace);
        let created = api
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|e| kube_err("create", "Pod", &args.generate_name, e))?;
        let name = created.name_any();
        info!(%name, "Pod created");

        Ok(Workload {
            name,
            namespace: args.namespace.clone(),
            cmd: args.cmd.clone(),
            run_as_user: args.run_as_user,
            container_image: args.container_image.clone(),
            pvc_name: args.pvc_name.clone(),
        })
    }

    async fn is_pod_ready(&self, namespace: &str, name: &str) -> Result<bool, CheckError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api
            .get(name)
            .await
            .map_err(|e| kube_err("get", "Pod", name, e))?;
        let status = pod.status.unwrap_or_default();

        if let Some(phase @ ("Failed" | "Succeeded")) = status.phase.as_deref() {
            return Err(CheckError::remote(
                format!("wait for Pod {name}"),
                format!("pod terminated in phase {phase}"),
            ));
        }
        Ok(status
            .conditions
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True"))
    }
}

// ---------------------------------------------------------------------------
// SnapshotCreator
// ---------------------------------------------------------------------------

#[async_trait]
impl SnapshotCreator for KubeCluster {
    #[instrument(skip(self, group_version), fields(%group_version))]
    async fn new_snapshotter(
        &self,
        group_version: &GroupVersion,
    ) -> Result<SnapshotHandle, CheckError> {
        let handle = SnapshotHandle::new(group_version.clone())?;
        let resources = self
            .client
            .list_api_group_resources(&group_version.to_string())
            .await
            .map_err(|e| CheckError::remote(format!("list resources of {group_version}"), e))?;
        if !resources.resources.iter().any(|r| r.name == "volumesnapshots") {
            return Err(CheckError::not_found(
                "resource volumesnapshots in",
                group_version.to_string(),
            ));
        }
        Ok(handle)
    }

    #[instrument(skip(self, handle, args, cancel), fields(pvc = %args.pvc_name, name = %args.snapshot_name))]
    async fn create_snapshot(
        &self,
        handle: &SnapshotHandle,
        args: &CreateSnapshotArgs,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, CheckError> {
        let spec = snapshot_spec(handle.protocol(), &args.volume_snapshot_class, &args.pvc_name);
        let (api, ar) = self.snapshot_api(handle.group_version(), &args.namespace);
        let snapshot = DynamicObject::new(&args.snapshot_name, &ar)
            .within(&args.namespace)
            .data(json!({ "spec": spec }));
        let created = api
            .create(&PostParams::default(), &snapshot)
            .await
            .map_err(|e| kube_err("create", VOLUME_SNAPSHOT_KIND, &args.snapshot_name, e))?;
        let name = created.name_any();
        info!(%name, "VolumeSnapshot created, waiting until ready to use");

        let ready = self.wait_snapshot_ready(&api, &name, cancel).await?;
        Ok(Snapshot {
            name,
            namespace: args.namespace.clone(),
            source_pvc: args.pvc_name.clone(),
            volume_snapshot_class: args.volume_snapshot_class.clone(),
            restore_size: string_at(&ready.data, "/status/restoreSize"),
        })
    }

    #[instrument(skip(self, handle, args, cancel), fields(name = %args.snapshot_name))]
    async fn create_from_source_check(
        &self,
        handle: &SnapshotHandle,
        args: &CreateFromSourceCheckArgs,
        cancel: &CancellationToken,
    ) -> Result<(), CheckError> {
        let mut clones = CloneSet::new(&uuid::Uuid::new_v4().simple().to_string());
        debug!(class = %clones.class, content = %clones.content, snapshot = %clones.snapshot, "creating clones");

        let outcome = self
            .create_from_source(handle, args, &mut clones, cancel)
            .await;
        self.remove_clones(handle.group_version(), &args.namespace, &clones)
            .await;

        outcome
    }
}

// ---------------------------------------------------------------------------
// DataReader
// ---------------------------------------------------------------------------

#[async_trait]
impl DataReader for KubeCluster {
    #[instrument(skip(self))]
    async fn read_data(&self, namespace: &str, pod: &str) -> Result<String, CheckError> {
        let op = format!("read {DATA_FILE_PATH} in Pod {pod}");
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut attached = api
            .exec(pod, vec!["cat", DATA_FILE_PATH], &AttachParams::default().stderr(false))
            .await
            .map_err(|e| CheckError::remote(&op, e))?;
        let mut stdout = attached
            .stdout()
            .ok_or_else(|| CheckError::remote(&op, "no stdout stream"))?;
        let mut out = String::new();
        stdout
            .read_to_string(&mut out)
            .await
            .map_err(|e| CheckError::remote(&op, e))?;
        drop(stdout);
        attached.join().await.map_err(|e| CheckError::remote(&op, e))?;
        Ok(out)
    }
}
