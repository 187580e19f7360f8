//! WildflyAppServer Custom Resource Definition
//!
//! A WildflyAppServer describes a cluster of identical WildFly nodes: how many
//! to run, which image to run, and how their standalone configuration is
//! sourced. The operator owns the status sub-resource.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{data_source_config_schema, ConfigSource, DataSourceConfig};

static NO_ADDRESSES: BTreeMap<String, String> = BTreeMap::new();

/// Specification for a WildflyAppServer
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "wildfly.banzaicloud.com",
    version = "v1alpha1",
    kind = "WildflyAppServer",
    plural = "wildflyappservers",
    shortname = "was",
    status = "WildflyAppServerStatus",
    namespaced,
    printcolumn = r#"{"name":"Nodes","type":"integer","jsonPath":".spec.nodeCount"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Application","type":"string","jsonPath":".status.externalAddresses.application"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WildflyAppServerSpec {
    /// Desired number of WildFly nodes
    #[serde(alias = "replicaCount")]
    pub node_count: u32,

    /// Container image running the WildFly server
    #[serde(alias = "containerImage")]
    pub image: String,

    /// Path probed by the liveness check, relative to the server root
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub application_path: String,

    /// ConfigMap holding the standalone configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,

    /// Key of the standalone configuration inside `configMapName`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standalone_config_key: Option<String>,

    /// Datasources to render into a generated standalone configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "data_source_config_schema")]
    pub data_source_config: Option<DataSourceConfig>,
}

impl WildflyAppServerSpec {
    /// The pinned configuration source, if both name and key are set
    pub fn config_source(&self) -> Option<ConfigSource> {
        match (&self.config_map_name, &self.standalone_config_key) {
            (Some(name), Some(key)) if !name.is_empty() && !key.is_empty() => Some(ConfigSource {
                config_map_name: name.clone(),
                key: key.clone(),
            }),
            _ => None,
        }
    }

    /// Returns true if a ConfigMap name has been pinned
    ///
    /// A name without a key still counts as pinned: the operator never
    /// generates a second configuration next to a user-chosen ConfigMap.
    pub fn has_pinned_config_map(&self) -> bool {
        self.config_map_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    /// Returns true if a configuration has to be rendered for this spec
    pub fn needs_generated_config(&self) -> bool {
        let has_datasources = self
            .data_source_config
            .as_ref()
            .is_some_and(|config| !config.is_empty());
        has_datasources && !self.has_pinned_config_map()
    }

    /// Pin the configuration source to the given ConfigMap and key
    pub fn pin_config_source(&mut self, source: &ConfigSource) {
        self.config_map_name = Some(source.config_map_name.clone());
        self.standalone_config_key = Some(source.key.clone());
    }
}

/// Status for a WildflyAppServer
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WildflyAppServerStatus {
    /// Names of the pods backing the Deployment, in last observed order
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Externally reachable endpoints keyed by role (application, management)
    #[serde(default)]
    pub external_addresses: BTreeMap<String, String>,
}

impl WildflyAppServer {
    /// Member names currently recorded in status
    pub fn recorded_nodes(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|s| s.nodes.as_slice())
            .unwrap_or_default()
    }

    /// External addresses currently recorded in status
    pub fn recorded_addresses(&self) -> &BTreeMap<String, String> {
        self.status
            .as_ref()
            .map_or(&NO_ADDRESSES, |s| &s.external_addresses)
    }

    /// Returns true once external addresses have been published
    pub fn has_external_addresses(&self) -> bool {
        !self.recorded_addresses().is_empty()
    }

    /// Returns true if the resource is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Key identifying this resource in operator-side registries
    pub fn registry_key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}
