//! Scan results
//!
//! Failures are recorded at the level they occur (namespace, deployment)
//! and aggregated into a [`ScanReport`] instead of only being logged, so a
//! partial failure is visible to callers and tests.

use k8s_openapi::api::apps::v1::Deployment;
use serde::Serialize;

/// Deployments listed from one namespace
#[derive(Clone, Debug)]
pub struct DeploymentBatch {
    /// Namespace the deployments were listed from
    pub namespace: String,
    /// Deployments in enumeration order
    pub deployments: Vec<Deployment>,
}

/// A namespace whose deployments could not be listed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NamespaceFailure {
    /// Namespace that was skipped
    pub namespace: String,
    /// Error reported by the accessor
    pub error: String,
}

/// Result of gathering deployments across all namespaces
#[derive(Clone, Debug, Default)]
pub struct Enumeration {
    /// One batch per namespace that listed successfully
    pub batches: Vec<DeploymentBatch>,
    /// Namespaces that were skipped
    pub failures: Vec<NamespaceFailure>,
}

impl Enumeration {
    /// Total deployments across all batches
    pub fn deployment_count(&self) -> usize {
        self.batches.iter().map(|b| b.deployments.len()).sum()
    }

    /// Flatten the batches, keeping enumeration order
    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.batches.iter().flat_map(|b| b.deployments.iter())
    }
}

/// What happened to one deployment during a scan
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    /// No update policy; ignored
    OptedOut,
    /// Policy set but driven by a different trigger
    OtherTrigger,
    /// Every container was handed to the watcher
    Dispatched {
        /// Number of watch requests issued
        watches: usize,
    },
    /// Processing stopped at a failing container
    Failed {
        /// Watch requests issued before the failure
        watches: usize,
        /// What went wrong
        error: String,
    },
}

/// Outcome of one deployment, with its identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    /// Deployment namespace
    pub namespace: String,
    /// Deployment name
    pub name: String,
    /// What the scan did with it
    #[serde(flatten)]
    pub outcome: DeploymentOutcome,
}

/// Aggregate result of one scan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Namespaces whose deployments were listed
    pub namespaces: usize,
    /// Namespaces skipped because listing failed
    pub namespace_failures: Vec<NamespaceFailure>,
    /// Per-deployment outcomes in enumeration order
    pub deployments: Vec<DeploymentReport>,
    /// The scan stopped early because shutdown was requested
    pub cancelled: bool,
}

impl ScanReport {
    /// Start a report from an enumeration, before any deployment is processed
    pub fn from_enumeration(enumeration: &Enumeration) -> Self {
        Self {
            namespaces: enumeration.batches.len(),
            namespace_failures: enumeration.failures.clone(),
            deployments: Vec::with_capacity(enumeration.deployment_count()),
            cancelled: false,
        }
    }

    /// Record the outcome of one deployment
    pub fn record(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        outcome: DeploymentOutcome,
    ) {
        self.deployments.push(DeploymentReport {
            namespace: namespace.into(),
            name: name.into(),
            outcome,
        });
    }

    /// Watch requests accepted by the watcher across all deployments
    pub fn watches(&self) -> usize {
        self.deployments
            .iter()
            .map(|d| match d.outcome {
                DeploymentOutcome::Dispatched { watches } => watches,
                DeploymentOutcome::Failed { watches, .. } => watches,
                _ => 0,
            })
            .sum()
    }

    /// Deployments that qualified for poll triggers
    pub fn qualifying(&self) -> usize {
        self.deployments
            .iter()
            .filter(|d| {
                matches!(
                    d.outcome,
                    DeploymentOutcome::Dispatched { .. } | DeploymentOutcome::Failed { .. }
                )
            })
            .count()
    }

    /// Deployments whose processing failed
    pub fn failures(&self) -> impl Iterator<Item = &DeploymentReport> {
        self.deployments
            .iter()
            .filter(|d| matches!(d.outcome, DeploymentOutcome::Failed { .. }))
    }

    /// True when every namespace listed and every qualifying deployment succeeded
    pub fn is_clean(&self) -> bool {
        self.namespace_failures.is_empty() && self.failures().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_aggregate_outcomes() {
        let mut report = ScanReport::default();
        report.record("default", "web", DeploymentOutcome::Dispatched { watches: 2 });
        report.record("default", "db", DeploymentOutcome::OptedOut);
        report.record("default", "hook", DeploymentOutcome::OtherTrigger);
        report.record(
            "prod",
            "broken",
            DeploymentOutcome::Failed {
                watches: 1,
                error: "watch failed".to_string(),
            },
        );

        assert_eq!(report.watches(), 3);
        assert_eq!(report.qualifying(), 2);
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_namespace_failures_make_report_unclean() {
        let enumeration = Enumeration {
            batches: vec![DeploymentBatch {
                namespace: "default".to_string(),
                deployments: vec![Deployment::default(), Deployment::default()],
            }],
            failures: vec![NamespaceFailure {
                namespace: "locked".to_string(),
                error: "forbidden".to_string(),
            }],
        };
        assert_eq!(enumeration.deployment_count(), 2);
        assert_eq!(enumeration.deployments().count(), 2);

        let report = ScanReport::from_enumeration(&enumeration);
        assert_eq!(report.namespaces, 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let report = DeploymentReport {
            namespace: "default".to_string(),
            name: "web".to_string(),
            outcome: DeploymentOutcome::Dispatched { watches: 1 },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "dispatched");
        assert_eq!(json["watches"], 1);
        assert_eq!(json["name"], "web");
    }
}
