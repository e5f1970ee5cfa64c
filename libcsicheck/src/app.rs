//! Application provisioning collaborator and the naming/command conventions
//! of the original and restored workloads.

use async_trait::async_trait;

use crate::error::CheckError;
use crate::types::{CreatePodArgs, CreatePvcArgs, VolumeClaim, Workload};

/// generateName prefix of the claim written by the original workload.
pub const ORIGINAL_PVC_GENERATE_NAME: &str = "csi-original-pvc-";
/// generateName prefix of the original workload.
pub const ORIGINAL_POD_GENERATE_NAME: &str = "csi-original-pod-";
/// generateName prefix of the claim restored from the snapshot.
pub const CLONED_PVC_GENERATE_NAME: &str = "csi-cloned-pvc-";
/// generateName prefix of the workload bound to the restored claim.
pub const CLONED_POD_GENERATE_NAME: &str = "csi-cloned-pod-";

/// Mount point of the claim inside every workload.
pub const DATA_MOUNT_PATH: &str = "/data";
/// File the original workload writes its payload to.
pub const DATA_FILE_PATH: &str = "/data/out.txt";

/// Keeps a workload running without touching the volume.
pub const IDLE_CMD: &str = "tail -f /dev/null";

/// Command of the original workload: append `payload` to the data file,
/// flush it to the volume, then idle so the pod stays up for the snapshot.
///
/// `payload` is written verbatim; single quotes in it are escaped for `sh`.
pub fn write_payload_cmd(payload: &str) -> String {
    let quoted = payload.replace('\'', r"'\''");
    format!("echo '{quoted}' >> {DATA_FILE_PATH}; sync; {IDLE_CMD}")
}

/// Which of the two applications of a run is being provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRole {
    Original,
    Restored,
}

impl AppRole {
    pub const fn pvc_generate_name(self) -> &'static str {
        match self {
            Self::Original => ORIGINAL_PVC_GENERATE_NAME,
            Self::Restored => CLONED_PVC_GENERATE_NAME,
        }
    }

    pub const fn pod_generate_name(self) -> &'static str {
        match self {
            Self::Original => ORIGINAL_POD_GENERATE_NAME,
            Self::Restored => CLONED_POD_GENERATE_NAME,
        }
    }

    /// Container command; `payload` is only written by the original role.
    pub fn command(self, payload: &str) -> String {
        match self {
            Self::Original => write_payload_cmd(payload),
            Self::Restored => IDLE_CMD.to_owned(),
        }
    }
}

/// Creates claims and pods and reports pod readiness.
///
/// Creation calls are not retried by the engine: the server assigns names, so
/// a blind retry could leave duplicates behind.
#[async_trait]
pub trait ApplicationCreator: Send + Sync {
    /// Create a PersistentVolumeClaim; the returned claim carries the
    /// server-assigned name.
    async fn create_pvc(&self, args: &CreatePvcArgs) -> Result<VolumeClaim, CheckError>;

    /// Create a Pod mounting `args.pvc_name` at [`DATA_MOUNT_PATH`].
    async fn create_pod(&self, args: &CreatePodArgs) -> Result<Workload, CheckError>;

    /// Single readiness probe. `Ok(false)` means "not yet"; an error means the
    /// pod can no longer become ready.
    async fn is_pod_ready(&self, namespace: &str, name: &str) -> Result<bool, CheckError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_commands() {
        assert_eq!(
            AppRole::Original.command("some string"),
            "echo 'some string' >> /data/out.txt; sync; tail -f /dev/null"
        );
        assert_eq!(AppRole::Restored.command("ignored"), "tail -f /dev/null");
    }

    #[test]
    fn payload_quotes_are_escaped() {
        assert_eq!(
            write_payload_cmd("it's"),
            r"echo 'it'\''s' >> /data/out.txt; sync; tail -f /dev/null"
        );
    }

    #[test]
    fn prefixes_are_distinct() {
        let prefixes = [
            ORIGINAL_PVC_GENERATE_NAME,
            ORIGINAL_POD_GENERATE_NAME,
            CLONED_PVC_GENERATE_NAME,
            CLONED_POD_GENERATE_NAME,
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in &prefixes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(AppRole::Restored.pvc_generate_name(), CLONED_PVC_GENERATE_NAME);
    }
}
