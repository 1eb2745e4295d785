//! Common types for the Keel poll trigger: errors, label policies, schedules
//! and logging setup

#![deny(missing_docs)]

use std::time::Duration;

pub mod error;
pub mod policy;
pub mod schedule;
pub mod telemetry;

pub use error::Error;
pub use policy::{LabelKeys, PolicyKind, TriggerKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default interval between deployment scans
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(55);

/// Default upper bound on a single scan; kept under the scan interval
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(50);

/// Poll schedule used when a deployment carries no schedule label
pub const DEFAULT_POLL_SCHEDULE: &str = "@every 1m";

/// Label key holding a deployment's update policy
pub const POLICY_LABEL_KEY: &str = "keel.policy";

/// Label key holding a deployment's trigger type
pub const TRIGGER_LABEL_KEY: &str = "keel.trigger";

/// Label key holding a deployment's poll schedule override
pub const POLL_SCHEDULE_LABEL_KEY: &str = "keel.pollSchedule";
