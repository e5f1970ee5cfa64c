//! Cluster implementations of the collaborator traits.
//!
//! Each backend module provides a concrete type that implements
//! [`ArgumentValidator`](crate::ArgumentValidator),
//! [`ApiVersionFetcher`](crate::ApiVersionFetcher),
//! [`ApplicationCreator`](crate::ApplicationCreator),
//! [`SnapshotCreator`](crate::SnapshotCreator) and
//! [`DataReader`](crate::DataReader).

pub mod kubernetes;
