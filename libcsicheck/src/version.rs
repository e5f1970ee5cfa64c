//! Snapshot API version discovery.
//!
//! The snapshot subsystem has shipped under several API versions. The alpha
//! generation keeps the driver identity of a VolumeSnapshotClass under a
//! different key than the beta/GA generations, and lays out the snapshot spec
//! differently. [`ProtocolVersion`] captures that split; everything that
//! depends on it goes through [`ProtocolVersion::driver_key`] and friends.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CheckError;

/// API group of the CSI snapshot subsystem.
pub const SNAPSHOT_API_GROUP: &str = "snapshot.storage.k8s.io";

/// Group-version served by the alpha generation.
pub const ALPHA_VERSION: &str = "snapshot.storage.k8s.io/v1alpha1";
/// Group-version served by the beta generation.
pub const BETA_VERSION: &str = "snapshot.storage.k8s.io/v1beta1";
/// Group-version served by the GA generation.
pub const V1_VERSION: &str = "snapshot.storage.k8s.io/v1";

/// VolumeSnapshotClass key holding the driver name in v1alpha1.
pub const VOL_SNAP_CLASS_ALPHA_DRIVER_KEY: &str = "snapshotter";
/// VolumeSnapshotClass key holding the driver name in v1beta1 and v1.
pub const VOL_SNAP_CLASS_STABLE_DRIVER_KEY: &str = "driver";

/// A discovered `group/version` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    /// Parse `"group/version"`.
    pub fn parse(s: &str) -> Result<Self, CheckError> {
        match s.split_once('/') {
            Some((group, version)) if !group.is_empty() && !version.is_empty() => Ok(Self {
                group: group.to_owned(),
                version: version.to_owned(),
            }),
            _ => Err(CheckError::UnsupportedVersion(s.to_owned())),
        }
    }

    /// Map to the protocol generation this group-version belongs to.
    pub fn protocol(&self) -> Result<ProtocolVersion, CheckError> {
        if self.group != SNAPSHOT_API_GROUP {
            return Err(CheckError::UnsupportedVersion(self.to_string()));
        }
        match self.version.as_str() {
            "v1alpha1" => Ok(ProtocolVersion::Alpha),
            "v1beta1" | "v1" => Ok(ProtocolVersion::Stable),
            _ => Err(CheckError::UnsupportedVersion(self.to_string())),
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.version)
    }
}

/// Snapshot API generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// `v1alpha1`.
    Alpha,
    /// `v1beta1` and `v1`.
    Stable,
}

impl ProtocolVersion {
    /// VolumeSnapshotClass field that names the driver.
    pub const fn driver_key(self) -> &'static str {
        match self {
            Self::Alpha => VOL_SNAP_CLASS_ALPHA_DRIVER_KEY,
            Self::Stable => VOL_SNAP_CLASS_STABLE_DRIVER_KEY,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha => f.write_str("alpha"),
            Self::Stable => f.write_str("stable"),
        }
    }
}

/// Discovers which snapshot API version the cluster serves.
///
/// Called once per run and never cached across runs, so a cluster upgraded
/// between runs is picked up. Failure is fatal to the run.
#[async_trait]
pub trait ApiVersionFetcher: Send + Sync {
    /// Preferred group-version of [`SNAPSHOT_API_GROUP`].
    async fn get_csi_snapshot_group_version(&self) -> Result<GroupVersion, CheckError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_classify() {
        let gv = GroupVersion::parse(ALPHA_VERSION).unwrap();
        assert_eq!(gv.version, "v1alpha1");
        assert_eq!(gv.protocol().unwrap(), ProtocolVersion::Alpha);
        assert_eq!(gv.to_string(), ALPHA_VERSION);

        for stable in [BETA_VERSION, V1_VERSION] {
            let gv = GroupVersion::parse(stable).unwrap();
            assert_eq!(gv.protocol().unwrap(), ProtocolVersion::Stable);
        }
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(GroupVersion::parse("v1").is_err());
        let gv = GroupVersion::parse("snapshot.storage.k8s.io/v2").unwrap();
        assert_eq!(
            gv.protocol(),
            Err(CheckError::UnsupportedVersion(
                "snapshot.storage.k8s.io/v2".into()
            ))
        );
        let gv = GroupVersion::parse("apps/v1").unwrap();
        assert!(gv.protocol().is_err());
    }

    #[test]
    fn driver_key_per_generation() {
        assert_eq!(ProtocolVersion::Alpha.driver_key(), "snapshotter");
        assert_eq!(ProtocolVersion::Stable.driver_key(), "driver");
    }
}
