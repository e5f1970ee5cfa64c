//! Restored-data read back.

use async_trait::async_trait;

use crate::error::CheckError;

/// Reads the data file from a running workload.
#[async_trait]
pub trait DataReader: Send + Sync {
    /// Contents of [`DATA_FILE_PATH`](crate::app::DATA_FILE_PATH) in the pod.
    async fn read_data(&self, namespace: &str, pod: &str) -> Result<String, CheckError>;
}
