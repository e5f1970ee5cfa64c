//! # libcsicheck: CSI snapshot/restore conformance for RK8s
//!
//! `libcsicheck` drives a storage driver through a full snapshot/restore
//! cycle on a live cluster and reports the first point of failure:
//!
//! 1. validate the namespace, StorageClass and VolumeSnapshotClass, and that
//!    both classes name the same driver;
//! 2. provision a claim and a pod that writes a payload into it;
//! 3. snapshot the claim and prove the snapshot can seed another snapshot;
//! 4. restore the snapshot into a new claim and bring a pod up on it;
//! 5. optionally read the payload back from the restored volume.
//!
//! The engine talks to the cluster only through the collaborator traits, so
//! every step can be exercised against a scripted implementation. The
//! [`backend::kubernetes`] module implements all of them with `kube`.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Run arguments, claims, workloads, snapshots, results. |
//! | [`error`] | [`CheckError`] taxonomy and [`Partial`] results. |
//! | [`version`] | Snapshot API version discovery and driver-key table. |
//! | [`validator`] | [`ArgumentValidator`] trait: read-only lookups. |
//! | [`app`] | [`ApplicationCreator`] trait and workload conventions. |
//! | [`snapshot`] | [`SnapshotCreator`] trait and [`SnapshotHandle`]. |
//! | [`data`] | [`DataReader`] trait: restored-data read back. |
//! | [`wait`] | Bounded, cancellable polling. |
//! | [`steps`] | [`SnapshotRestoreSteps`]: the workflow. |
//! | [`report`] | [`RunReport`] rendering. |
//! | [`backend`] | Cluster implementations of the collaborator traits. |

pub mod app;
pub mod backend;
pub mod data;
pub mod error;
pub mod report;
pub mod snapshot;
pub mod steps;
pub mod types;
pub mod validator;
pub mod version;
pub mod wait;

#[cfg(test)]
mod testing;

// Re-export the most commonly used items at crate root for convenience.
pub use app::ApplicationCreator;
pub use data::DataReader;
pub use error::{CheckError, Partial};
pub use report::RunReport;
pub use snapshot::{SnapshotCreator, SnapshotHandle};
pub use steps::{SnapshotRestoreSteps, Stage, WorkflowError};
pub use types::*;
pub use validator::ArgumentValidator;
pub use version::{ApiVersionFetcher, GroupVersion, ProtocolVersion};
pub use wait::WaitPolicy;
