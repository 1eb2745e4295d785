//! Poll manager: periodic deployment scan and watch dispatch
//!
//! Every scan lists all deployments, keeps those labelled for poll triggers
//! and hands each of their container images to the watcher together with
//! the deployment's poll schedule. Nothing is cached between scans: the
//! watcher deduplicates, so re-issuing every request each time is how
//! label changes and restarts converge.
//!
//! Failures are contained at the level they happen:
//! - namespace listing failure aborts the scan (returned to the caller)
//! - deployment listing failure skips that namespace
//! - schedule or watch failure skips the rest of that deployment
//! - a failed scan is logged and the next tick scans again

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Container;
use kube::ResourceExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use keel_common::policy::{classify_policy, classify_trigger, poll_schedule};
use keel_common::{Error, PolicyKind, TriggerKind};

use crate::accessor::ClusterAccessor;
use crate::config::PollConfig;
use crate::report::{
    DeploymentBatch, DeploymentOutcome, Enumeration, NamespaceFailure, ScanReport,
};
use crate::watcher::{WatchRequest, Watcher};

/// Scans deployments on an interval and registers poll watches
pub struct PollManager {
    accessor: Arc<dyn ClusterAccessor>,
    watcher: Arc<dyn Watcher>,
    config: PollConfig,
}

impl PollManager {
    /// Create a manager; `config` is expected to have passed
    /// [`PollConfig::validate`]
    pub fn new(
        accessor: Arc<dyn ClusterAccessor>,
        watcher: Arc<dyn Watcher>,
        config: PollConfig,
    ) -> Self {
        Self {
            accessor,
            watcher,
            config,
        }
    }

    /// The configuration this manager runs with
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Scan immediately, then every `scan_interval` until `token` is cancelled
    ///
    /// Returns `Ok(())` on cancellation. Scan failures are logged and retried
    /// on the next tick. With `fail_on_initial_scan_error` set, a first scan
    /// that can't enumerate the cluster (including one that times out while
    /// enumerating) is returned; dispatch problems never are.
    pub async fn start(&self, token: CancellationToken) -> Result<(), Error> {
        if token.is_cancelled() {
            return Ok(());
        }

        info!(
            interval = ?self.config.scan_interval,
            timeout = ?self.config.scan_timeout,
            default_schedule = %self.config.default_schedule,
            "starting poll trigger"
        );

        if let Err(e) = self.bounded_scan(&token).await {
            error!(error = %e, retryable = e.is_retryable(), "initial scan failed");
            if self.config.fail_on_initial_scan_error && matches!(e, Error::Enumeration { .. }) {
                return Err(e);
            }
        }

        let period = self.config.scan_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // a scan that overruns the interval swallows the missed tick
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("poll trigger stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            debug!("performing scan");
            if let Err(e) = self.bounded_scan(&token).await {
                error!(error = %e, retryable = e.is_retryable(), "scan failed");
            }
        }
    }

    /// Scan with both phases sharing one `scan_timeout` deadline
    ///
    /// Running out of time while enumerating is an enumeration failure;
    /// running out while dispatching is a plain timeout.
    #[instrument(skip_all)]
    async fn bounded_scan(&self, token: &CancellationToken) -> Result<ScanReport, Error> {
        let timeout = self.config.scan_timeout;
        let deadline = Instant::now() + timeout;

        let enumeration = tokio::time::timeout_at(deadline, self.deployments())
            .await
            .map_err(|_| Error::enumeration(Error::timeout("enumeration", timeout)))??;
        let report = tokio::time::timeout_at(deadline, self.dispatch(&enumeration, token))
            .await
            .map_err(|_| Error::timeout("scan", timeout))?;

        info!(
            namespaces = report.namespaces,
            namespace_failures = report.namespace_failures.len(),
            deployments = report.deployments.len(),
            qualifying = report.qualifying(),
            watches = report.watches(),
            failed = report.failures().count(),
            cancelled = report.cancelled,
            "scan complete"
        );
        Ok(report)
    }

    /// Run one scan over every deployment in the cluster
    ///
    /// Only namespace enumeration failure is returned as an error; everything
    /// below that is recorded in the report. The token is checked between
    /// deployments so shutdown doesn't wait for a full traversal.
    #[instrument(skip_all)]
    pub async fn scan(&self, token: &CancellationToken) -> Result<ScanReport, Error> {
        let enumeration = self.deployments().await?;
        Ok(self.dispatch(&enumeration, token).await)
    }

    async fn dispatch(&self, enumeration: &Enumeration, token: &CancellationToken) -> ScanReport {
        let mut report = ScanReport::from_enumeration(enumeration);

        for deployment in enumeration.deployments() {
            if token.is_cancelled() {
                warn!("scan interrupted by shutdown");
                report.cancelled = true;
                break;
            }

            let outcome = self.process_deployment(deployment).await;
            report.record(
                deployment.namespace().unwrap_or_default(),
                deployment.name_any(),
                outcome,
            );
        }

        report
    }

    async fn process_deployment(&self, deployment: &Deployment) -> DeploymentOutcome {
        let labels = deployment.labels();

        if classify_policy(labels, &self.config.labels) == PolicyKind::None {
            return DeploymentOutcome::OptedOut;
        }
        // other triggers (webhooks, pubsub) are handled elsewhere
        if classify_trigger(labels, &self.config.labels) != TriggerKind::Poll {
            return DeploymentOutcome::OtherTrigger;
        }

        let mut watches = 0;
        match self.dispatch_containers(deployment, &mut watches).await {
            Ok(()) => DeploymentOutcome::Dispatched { watches },
            // already logged with container context
            Err(e) => DeploymentOutcome::Failed {
                watches,
                error: e.to_string(),
            },
        }
    }

    /// Register a watch for every container of a poll-triggered deployment
    ///
    /// Stops at the first container whose schedule is invalid or whose watch
    /// fails, returning that error. On success returns the number of watch
    /// requests issued.
    pub async fn check_deployment(&self, deployment: &Deployment) -> Result<usize, Error> {
        let mut watches = 0;
        self.dispatch_containers(deployment, &mut watches).await?;
        Ok(watches)
    }

    async fn dispatch_containers(
        &self,
        deployment: &Deployment,
        watches: &mut usize,
    ) -> Result<(), Error> {
        let labels = deployment.labels();

        for container in containers(deployment) {
            let image = container.image.as_deref().unwrap_or_default();

            let schedule = match poll_schedule(labels, &self.config.labels) {
                Some(schedule) => {
                    if let Err(e) = keel_common::schedule::validate(schedule) {
                        error!(
                            error = %e,
                            retryable = e.is_retryable(),
                            schedule = %schedule,
                            image = %image,
                            deployment = %deployment.name_any(),
                            namespace = %deployment.namespace().unwrap_or_default(),
                            "failed to parse poll schedule"
                        );
                        return Err(e);
                    }
                    schedule
                }
                None => self.config.default_schedule.as_str(),
            };

            let request = WatchRequest::new(image, schedule);
            if let Err(e) = self.watcher.watch(&request).await {
                error!(
                    error = %e,
                    retryable = e.is_retryable(),
                    schedule = %schedule,
                    image = %image,
                    deployment = %deployment.name_any(),
                    namespace = %deployment.namespace().unwrap_or_default(),
                    "failed to start watching repository"
                );
                return Err(e);
            }
            *watches += 1;
        }

        Ok(())
    }

    /// Gather deployments from every namespace
    ///
    /// A namespace whose deployments can't be listed is logged and skipped;
    /// failing to list namespaces at all is an error.
    pub async fn deployments(&self) -> Result<Enumeration, Error> {
        let namespaces = self
            .accessor
            .list_namespaces()
            .await
            .map_err(Error::enumeration)?;

        let mut enumeration = Enumeration::default();
        for namespace in namespaces {
            match self.accessor.list_deployments(&namespace).await {
                Ok(deployments) => enumeration.batches.push(DeploymentBatch {
                    namespace,
                    deployments,
                }),
                Err(e) => {
                    error!(
                        error = %e,
                        namespace = %namespace,
                        "failed to list deployments"
                    );
                    enumeration.failures.push(NamespaceFailure {
                        namespace,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(enumeration)
    }
}

/// Containers of the deployment's pod template, empty when unset
fn containers(deployment: &Deployment) -> &[Container] {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .unwrap_or_default()
}
