//! Poll trigger scan loop for Keel
//!
//! This crate finds deployments that opted into poll-based updates and keeps
//! their image repositories registered with a watcher:
//!
//! - **Accessor**: Read-only cluster view (namespaces, deployments)
//! - **Manager**: Periodic scan, classification and watch dispatch
//! - **Watcher**: Watch seam plus the in-memory subscription registry
//! - **Report**: Per-namespace and per-deployment scan outcomes

#![deny(missing_docs)]

pub mod accessor;
pub mod config;
pub mod manager;
pub mod report;
pub mod watcher;

pub use accessor::{ClusterAccessor, KubeClusterAccessor};
pub use config::PollConfig;
pub use manager::PollManager;
pub use report::{
    DeploymentBatch, DeploymentOutcome, DeploymentReport, Enumeration, NamespaceFailure,
    ScanReport,
};
pub use watcher::{Registration, Subscription, SubscriptionRegistry, WatchRequest, Watcher};
