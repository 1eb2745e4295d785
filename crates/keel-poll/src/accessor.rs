//! Cluster accessor: namespace and deployment enumeration
//!
//! The scan loop reads the cluster through [`ClusterAccessor`] so tests can
//! substitute a mock and alternative backends can be plugged in.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use keel_common::Error;

/// Connection timeout for the API server
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for list calls
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only view of the cluster used by the scan loop
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// List the names of every visible namespace
    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// List every deployment in a namespace
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, Error>;
}

/// Accessor backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterAccessor {
    client: Client,
}

impl KubeClusterAccessor {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from in-cluster config or the local kubeconfig
    pub async fn infer() -> Result<Self, Error> {
        let mut config = kube::Config::infer()
            .await
            .map_err(kube::Error::InferConfig)?;
        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
        Ok(Self::new(Client::try_from(config)?))
    }
}

#[async_trait]
impl ClusterAccessor for KubeClusterAccessor {
    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let names: Vec<String> = list.items.iter().map(|ns| ns.name_any()).collect();
        debug!(count = names.len(), "listed namespaces");
        Ok(names)
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        debug!(namespace = %namespace, count = list.items.len(), "listed deployments");
        Ok(list.items)
    }
}
