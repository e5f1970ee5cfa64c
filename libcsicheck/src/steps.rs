//! The snapshot/restore workflow.
//!
//! [`SnapshotRestoreSteps`] drives the collaborators through a strictly linear
//! sequence:
//!
//! ```text
//! Start -> ArgsValidated -> OriginalAppReady -> SnapshotVerified
//!       -> RestoredAppReady [-> DataVerified] -> Done
//! ```
//!
//! Each step consumes names produced by the previous one. Nothing is retried
//! and nothing is rolled back: the first failure ends the run and is returned
//! together with every object created so far.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::app::{AppRole, ApplicationCreator};
use crate::data::DataReader;
use crate::error::{CheckError, Partial};
use crate::snapshot::{SnapshotCreator, VOLUME_SNAPSHOT_KIND};
use crate::types::*;
use crate::validator::ArgumentValidator;
use crate::version::{ApiVersionFetcher, GroupVersion, SNAPSHOT_API_GROUP};
use crate::wait::{PollError, WaitPolicy, poll_until};

/// Workflow states, in order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    #[default]
    Start,
    ArgsValidated,
    OriginalAppReady,
    SnapshotVerified,
    RestoredAppReady,
    DataVerified,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "Start",
            Self::ArgsValidated => "ArgsValidated",
            Self::OriginalAppReady => "OriginalAppReady",
            Self::SnapshotVerified => "SnapshotVerified",
            Self::RestoredAppReady => "RestoredAppReady",
            Self::DataVerified => "DataVerified",
            Self::Done => "Done",
        };
        f.write_str(s)
    }
}

/// A failed run: the last state reached and the step failure, unchanged.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("snapshot/restore failed after {reached}: {source}")]
pub struct WorkflowError {
    pub reached: Stage,
    pub source: CheckError,
}

/// Outcome of [`SnapshotRestoreSteps::run`].
pub type RunResult = Result<SnapshotRestoreResults, Partial<SnapshotRestoreResults, WorkflowError>>;

/// Orchestrates validation, provisioning, snapshotting and restore.
///
/// Holds no per-run state, so one instance can drive several runs
/// concurrently as long as they use disjoint names.
pub struct SnapshotRestoreSteps {
    validate_ops: Arc<dyn ArgumentValidator>,
    version_fetch: Arc<dyn ApiVersionFetcher>,
    create_app_ops: Arc<dyn ApplicationCreator>,
    snapshot_create_ops: Arc<dyn SnapshotCreator>,
    data_reader: Option<Arc<dyn DataReader>>,
    ready_wait: WaitPolicy,
}

impl SnapshotRestoreSteps {
    pub fn new(
        validate_ops: Arc<dyn ArgumentValidator>,
        version_fetch: Arc<dyn ApiVersionFetcher>,
        create_app_ops: Arc<dyn ApplicationCreator>,
        snapshot_create_ops: Arc<dyn SnapshotCreator>,
    ) -> Self {
        Self {
            validate_ops,
            version_fetch,
            create_app_ops,
            snapshot_create_ops,
            data_reader: None,
            ready_wait: WaitPolicy::default(),
        }
    }

    /// Use one object for all four collaborators.
    pub fn from_cluster<T>(cluster: Arc<T>) -> Self
    where
        T: ArgumentValidator + ApiVersionFetcher + ApplicationCreator + SnapshotCreator + 'static,
    {
        Self::new(
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            cluster,
        )
    }

    /// Read the payload back from the restored workload before finishing.
    pub fn with_data_reader(mut self, reader: Arc<dyn DataReader>) -> Self {
        self.data_reader = Some(reader);
        self
    }

    /// Bound on pod readiness.
    pub fn with_ready_wait(mut self, policy: WaitPolicy) -> Self {
        self.ready_wait = policy;
        self
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Gate the run: local argument check, then namespace, storage class,
    /// API version and snapshot class, in that order. Returns the resolved
    /// snapshot API version for the rest of the run.
    #[instrument(skip_all, fields(sc = %args.storage_class, vsc = %args.volume_snapshot_class))]
    pub async fn validate_args(
        &self,
        args: &SnapshotRestoreArgs,
    ) -> Result<GroupVersion, CheckError> {
        args.validate()?;

        self.validate_ops
            .validate_namespace(&args.namespace)
            .await
            .map_err(|e| e.during("validate namespace"))?;

        let sc = self
            .validate_ops
            .validate_storage_class(&args.storage_class)
            .await
            .map_err(|e| e.during("validate storage class"))?;

        let group_version = self
            .version_fetch
            .get_csi_snapshot_group_version()
            .await
            .map_err(|e| e.during("fetch snapshot API version"))?;
        let protocol = group_version.protocol()?;

        let vsc = self
            .validate_ops
            .validate_volume_snapshot_class(&args.volume_snapshot_class, &group_version)
            .await
            .map_err(|e| e.during("validate volume snapshot class"))?;

        let driver = vsc
            .field(protocol.driver_key())
            .unwrap_or_default()
            .to_owned();
        if driver != sc.provisioner {
            return Err(CheckError::DriverMismatch {
                storage_class: sc.name,
                provisioner: sc.provisioner,
                snapshot_class: vsc.name,
                driver,
            });
        }

        info!(%group_version, %protocol, %driver, "arguments validated");
        Ok(group_version)
    }

    /// Provision the original claim and a pod that writes `payload` into it.
    pub async fn create_application(
        &self,
        args: &SnapshotRestoreArgs,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<Application, Partial<AppResources>> {
        let pvc_args = CreatePvcArgs {
            generate_name: AppRole::Original.pvc_generate_name().to_owned(),
            storage_class: args.storage_class.clone(),
            namespace: args.namespace.clone(),
            data_source: None,
            restore_size: None,
        };
        self.provision(args, AppRole::Original, pvc_args, payload, cancel)
            .await
    }

    /// Provision a claim restored from `snapshot` and an idle pod on it.
    ///
    /// The claim asks for the snapshot's restore size when the driver reported
    /// one; otherwise the collaborator's default capacity applies.
    pub async fn restore_application(
        &self,
        args: &SnapshotRestoreArgs,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> Result<Application, Partial<AppResources>> {
        let pvc_args = CreatePvcArgs {
            generate_name: AppRole::Restored.pvc_generate_name().to_owned(),
            storage_class: args.storage_class.clone(),
            namespace: args.namespace.clone(),
            data_source: Some(DataSource {
                api_group: SNAPSHOT_API_GROUP.to_owned(),
                kind: VOLUME_SNAPSHOT_KIND.to_owned(),
                name: snapshot.name.clone(),
            }),
            restore_size: snapshot.restore_size.clone(),
        };
        self.provision(args, AppRole::Restored, pvc_args, "", cancel)
            .await
    }

    /// Claim, then pod, then bounded readiness wait.
    #[instrument(skip(self, args, pvc_args, payload, cancel), fields(ns = %args.namespace))]
    async fn provision(
        &self,
        args: &SnapshotRestoreArgs,
        role: AppRole,
        pvc_args: CreatePvcArgs,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<Application, Partial<AppResources>> {
        let pvc = self
            .create_app_ops
            .create_pvc(&pvc_args)
            .await
            .map_err(|e| Partial::new(AppResources::default(), e.during("create pvc")))?;

        let pod_args = CreatePodArgs {
            generate_name: role.pod_generate_name().to_owned(),
            pvc_name: pvc.name.clone(),
            namespace: args.namespace.clone(),
            cmd: role.command(payload),
            run_as_user: args.run_as_user,
            container_image: args.container_image.clone(),
        };
        let pod = match self.create_app_ops.create_pod(&pod_args).await {
            Ok(pod) => pod,
            Err(e) => {
                return Err(Partial::new(
                    AppResources {
                        pvc: Some(pvc),
                        pod: None,
                    },
                    e.during("create pod"),
                ));
            }
        };

        let ops = &self.create_app_ops;
        let (ns, name) = (pod.namespace.as_str(), pod.name.as_str());
        let waited = poll_until(self.ready_wait, cancel, move || ops.is_pod_ready(ns, name)).await;
        if let Err(e) = waited {
            let error = match e {
                PollError::Cancelled => CheckError::Cancelled,
                other => CheckError::WorkloadNotReady {
                    namespace: pod.namespace.clone(),
                    name: pod.name.clone(),
                    reason: other.to_string(),
                },
            };
            return Err(Partial::new(
                AppResources {
                    pvc: Some(pvc),
                    pod: Some(pod),
                },
                error,
            ));
        }

        info!(pvc = %pvc.name, pod = %pod.name, "application ready");
        Ok(Application { pvc, pod })
    }

    /// Snapshot `pvc` and confirm the snapshot can act as a restore source.
    ///
    /// When only the confirmation fails the created snapshot is returned in
    /// the [`Partial`].
    #[instrument(skip_all, fields(pvc = %pvc.name, snapshot = snapshot_name))]
    pub async fn snapshot_application(
        &self,
        args: &SnapshotRestoreArgs,
        pvc: &VolumeClaim,
        snapshot_name: &str,
        group_version: &GroupVersion,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, Partial<Option<Snapshot>>> {
        let handle = self
            .snapshot_create_ops
            .new_snapshotter(group_version)
            .await
            .map_err(|e| Partial::new(None, e.during("load snapshotter")))?;

        let create_args = CreateSnapshotArgs {
            namespace: args.namespace.clone(),
            pvc_name: pvc.name.clone(),
            volume_snapshot_class: args.volume_snapshot_class.clone(),
            snapshot_name: snapshot_name.to_owned(),
        };
        let snapshot = self
            .snapshot_create_ops
            .create_snapshot(&handle, &create_args, cancel)
            .await
            .map_err(|e| Partial::new(None, e.during("create snapshot")))?;

        let cfs_args = CreateFromSourceCheckArgs {
            volume_snapshot_class: args.volume_snapshot_class.clone(),
            snapshot_name: snapshot.name.clone(),
            namespace: args.namespace.clone(),
        };
        if let Err(e) = self
            .snapshot_create_ops
            .create_from_source_check(&handle, &cfs_args, cancel)
            .await
        {
            let error = match e {
                CheckError::CreateFromSource { .. } | CheckError::Cancelled => e,
                other => CheckError::CreateFromSource {
                    name: snapshot.name.clone(),
                    reason: other.to_string(),
                },
            };
            return Err(Partial::new(Some(snapshot), error));
        }

        info!(name = %snapshot.name, restore_size = ?snapshot.restore_size, "snapshot verified");
        Ok(snapshot)
    }

    /// Compare the restored data file, minus the single newline `echo`
    /// appends, with `payload`.
    pub async fn validate_data(
        &self,
        reader: &dyn DataReader,
        pod: &Workload,
        payload: &str,
    ) -> Result<(), CheckError> {
        let raw = reader
            .read_data(&pod.namespace, &pod.name)
            .await
            .map_err(|e| e.during("read restored data"))?;
        let found = raw.strip_suffix('\n').unwrap_or(raw.as_str());
        if found != payload {
            return Err(CheckError::DataMismatch {
                expected: payload.to_owned(),
                found: found.to_owned(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Full run
    // -----------------------------------------------------------------------

    /// Run every step in order and stop at the first failure.
    #[instrument(skip_all, fields(ns = %args.namespace, sc = %args.storage_class))]
    pub async fn run(
        &self,
        args: &SnapshotRestoreArgs,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> RunResult {
        let mut run = Progress::default();

        run.check_cancelled(cancel)?;
        let group_version = run.step(self.validate_args(args).await)?;
        run.advance(Stage::ArgsValidated);

        run.check_cancelled(cancel)?;
        let original = self
            .create_application(args, &params.payload, cancel)
            .await
            .map_err(|p| run.fail_app(p, false))?;
        run.results.original_pvc = Some(original.pvc.clone());
        run.results.original_pod = Some(original.pod);
        run.advance(Stage::OriginalAppReady);

        run.check_cancelled(cancel)?;
        let snapshot = match self
            .snapshot_application(
                args,
                &original.pvc,
                &params.snapshot_name,
                &group_version,
                cancel,
            )
            .await
        {
            Ok(snapshot) => snapshot,
            Err(p) => {
                run.results.snapshot = p.value;
                return Err(run.fail(p.error));
            }
        };
        run.results.snapshot = Some(snapshot.clone());
        run.advance(Stage::SnapshotVerified);

        run.check_cancelled(cancel)?;
        let restored = self
            .restore_application(args, &snapshot, cancel)
            .await
            .map_err(|p| run.fail_app(p, true))?;
        run.results.cloned_pvc = Some(restored.pvc);
        run.results.cloned_pod = Some(restored.pod.clone());
        run.advance(Stage::RestoredAppReady);

        if let Some(reader) = &self.data_reader {
            run.check_cancelled(cancel)?;
            run.step(
                self.validate_data(reader.as_ref(), &restored.pod, &params.payload)
                    .await,
            )?;
            run.advance(Stage::DataVerified);
        }

        run.advance(Stage::Done);
        Ok(run.results)
    }
}

/// Per-run bookkeeping for [`SnapshotRestoreSteps::run`].
#[derive(Default)]
struct Progress {
    stage: Stage,
    results: SnapshotRestoreResults,
}

impl Progress {
    fn advance(&mut self, stage: Stage) {
        info!(from = %self.stage, to = %stage, "stage reached");
        self.stage = stage;
    }

    fn fail(&mut self, source: CheckError) -> Partial<SnapshotRestoreResults, WorkflowError> {
        warn!(reached = %self.stage, error = %source, "snapshot/restore run failed");
        Partial::new(
            std::mem::take(&mut self.results),
            WorkflowError {
                reached: self.stage,
                source,
            },
        )
    }

    fn fail_app(
        &mut self,
        partial: Partial<AppResources>,
        restored: bool,
    ) -> Partial<SnapshotRestoreResults, WorkflowError> {
        let Partial { value, error } = partial;
        if restored {
            self.results.cloned_pvc = value.pvc;
            self.results.cloned_pod = value.pod;
        } else {
            self.results.original_pvc = value.pvc;
            self.results.original_pod = value.pod;
        }
        self.fail(error)
    }

    fn step<T>(
        &mut self,
        res: Result<T, CheckError>,
    ) -> Result<T, Partial<SnapshotRestoreResults, WorkflowError>> {
        res.map_err(|e| self.fail(e))
    }

    fn check_cancelled(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), Partial<SnapshotRestoreResults, WorkflowError>> {
        if cancel.is_cancelled() {
            return Err(self.fail(CheckError::Cancelled));
        }
        Ok(())
    }
}
