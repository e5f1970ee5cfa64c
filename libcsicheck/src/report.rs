//! Run report printed by the CLI.
//!
//! [`RunReport`] is built from the outcome of
//! [`SnapshotRestoreSteps::run`](crate::steps::SnapshotRestoreSteps::run) and
//! renders either as human-readable text ([`fmt::Display`]) or as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CheckError;
use crate::steps::{RunResult, Stage};
use crate::types::{SnapshotRestoreArgs, SnapshotRestoreResults};

/// Pass/fail verdict of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed { reached: Stage, error: CheckError },
}

/// Summary of a run: what was tested, the verdict and what was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub args: SnapshotRestoreArgs,
    pub outcome: Outcome,
    pub results: SnapshotRestoreResults,
}

impl RunReport {
    pub fn new(args: &SnapshotRestoreArgs, result: &RunResult) -> Self {
        let (outcome, results) = match result {
            Ok(results) => (Outcome::Passed, results.clone()),
            Err(partial) => (
                Outcome::Failed {
                    reached: partial.error.reached,
                    error: partial.error.source.clone(),
                },
                partial.value.clone(),
            ),
        };
        Self {
            args: args.clone(),
            outcome,
            results,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CSI snapshot/restore check: StorageClass={} VolumeSnapshotClass={} Namespace={}",
            self.args.storage_class, self.args.volume_snapshot_class, self.args.namespace
        )?;
        for created in self.results.created() {
            writeln!(f, "  created {created}")?;
        }
        match &self.outcome {
            Outcome::Passed => write!(f, "  PASSED"),
            Outcome::Failed { reached, error } => {
                write!(f, "  FAILED after {reached}: {error}")
            }
        }
    }
}
