//! Kubernetes store access for the WildFly controllers
//!
//! Every read and write the reconcilers perform goes through [`KubeClient`],
//! so the reconcile logic can be driven by mocks in tests while production
//! uses [`KubeClientImpl`] on top of a kube-rs [`Client`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ConfigSource, WildflyAppServer};
use crate::error::{is_conflict, is_not_found};
use crate::workload;
use crate::Error;

/// Result of a create call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The object was created by this call
    Created,
    /// An object with the same name already existed
    AlreadyExists,
}

/// Trait abstracting Kubernetes client operations for WildflyAppServer
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Create the generated configuration ConfigMap
    async fn create_config_map(
        &self,
        config_map: &workload::ConfigMap,
    ) -> Result<CreateOutcome, Error>;

    /// Pin `configMapName`/`standaloneConfigKey` on the WildflyAppServer spec
    async fn pin_config_source(
        &self,
        namespace: &str,
        name: &str,
        source: &ConfigSource,
    ) -> Result<(), Error>;

    /// Create the Deployment
    async fn create_deployment(
        &self,
        deployment: &workload::Deployment,
    ) -> Result<CreateOutcome, Error>;

    /// Read the replica count of a live Deployment
    ///
    /// An unset replica count reads as 1, the API server default.
    async fn get_deployment_replicas(&self, namespace: &str, name: &str) -> Result<u32, Error>;

    /// Set the replica count of a Deployment
    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: u32)
        -> Result<(), Error>;

    /// List the names of the pods matching a label selector, in API order
    async fn list_pod_names(&self, namespace: &str, selector: &str) -> Result<Vec<String>, Error>;

    /// Write `status.nodes`
    async fn patch_member_status(
        &self,
        namespace: &str,
        name: &str,
        nodes: &[String],
    ) -> Result<(), Error>;

    /// Create the LoadBalancer Service
    async fn create_service(&self, service: &workload::Service) -> Result<CreateOutcome, Error>;

    /// Read a Service, `None` if it does not exist
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Read a WildflyAppServer, `None` if it does not exist
    async fn get_app_server(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WildflyAppServer>, Error>;

    /// Write `status.externalAddresses`
    async fn patch_external_addresses(
        &self,
        namespace: &str,
        name: &str,
        addresses: &BTreeMap<String, String>,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a namespaced object, treating 409 as an existing object
    async fn create<K>(
        &self,
        namespace: &str,
        object: &K,
        operation: &str,
    ) -> Result<CreateOutcome, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + Serialize
            + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), object).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if is_conflict(&e) => {
                debug!(%operation, "object already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(Error::kube_operation(operation, e)),
        }
    }

    fn app_servers(&self, namespace: &str) -> Api<WildflyAppServer> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn create_config_map(
        &self,
        config_map: &workload::ConfigMap,
    ) -> Result<CreateOutcome, Error> {
        let wire: ConfigMap = workload::into_wire(config_map)?;
        self.create(&config_map.metadata.namespace, &wire, "create config map")
            .await
    }

    async fn pin_config_source(
        &self,
        namespace: &str,
        name: &str,
        source: &ConfigSource,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "spec": {
                "configMapName": source.config_map_name,
                "standaloneConfigKey": source.key,
            }
        });
        self.app_servers(namespace)
            .patch(
                name,
                &PatchParams::apply(crate::FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| Error::kube_operation("pin configuration source", e))?;
        Ok(())
    }

    async fn create_deployment(
        &self,
        deployment: &workload::Deployment,
    ) -> Result<CreateOutcome, Error> {
        let wire: Deployment = workload::into_wire(deployment)?;
        self.create(&deployment.metadata.namespace, &wire, "create deployment")
            .await
    }

    async fn get_deployment_replicas(&self, namespace: &str, name: &str) -> Result<u32, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api
            .get(name)
            .await
            .map_err(|e| Error::kube_operation("get deployment", e))?;
        let replicas = deployment.spec.and_then(|s| s.replicas).unwrap_or(1);
        Ok(u32::try_from(replicas).unwrap_or_default())
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch(
            name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::kube_operation("scale deployment", e))?;
        Ok(())
    }

    async fn list_pod_names(&self, namespace: &str, selector: &str) -> Result<Vec<String>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| Error::kube_operation("list pods", e))?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn patch_member_status(
        &self,
        namespace: &str,
        name: &str,
        nodes: &[String],
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "status": { "nodes": nodes } });
        self.app_servers(namespace)
            .patch_status(
                name,
                &PatchParams::apply(crate::FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| Error::kube_operation("update member status", e))?;
        Ok(())
    }

    async fn create_service(&self, service: &workload::Service) -> Result<CreateOutcome, Error> {
        let wire: Service = workload::into_wire(service)?;
        self.create(&service.metadata.namespace, &wire, "create service")
            .await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(service) => Ok(Some(service)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::kube_operation("get service", e)),
        }
    }

    async fn get_app_server(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WildflyAppServer>, Error> {
        match self.app_servers(namespace).get(name).await {
            Ok(server) => Ok(Some(server)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::kube_operation("get application server", e)),
        }
    }

    async fn patch_external_addresses(
        &self,
        namespace: &str,
        name: &str,
        addresses: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "status": { "externalAddresses": addresses } });
        self.app_servers(namespace)
            .patch_status(
                name,
                &PatchParams::apply(crate::FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| Error::kube_operation("update external addresses", e))?;
        Ok(())
    }
}
