//! Desired-state records for the child resources of a WildflyAppServer
//!
//! The builder in [`builder`] produces these records from a WildflyAppServer:
//! - Deployment: the WildFly nodes
//! - Service: LoadBalancer exposing the application and management ports
//! - ConfigMap: generated standalone configuration (optional)
//!
//! Records are plain serde structs shaped like the Kubernetes wire format.
//! [`into_wire`] converts them into k8s-openapi types at the client boundary.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crd::WildflyAppServer;
use crate::{Error, Result};

pub mod builder;

pub use builder::{
    build_config_map, build_deployment, build_service, label_selector, labels, GeneratedConfig,
    CONFIG_MOUNT_PATH, CONFIG_VOLUME_NAME, GENERATED_CONFIG_KEY, SERVER_CONFIG_FILE,
};

// =============================================================================
// Metadata
// =============================================================================

/// Object metadata for a child resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Owner references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Create metadata for a child named `name` in `namespace`
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            owner_references: Vec::new(),
        }
    }

    /// Replace the labels
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Mark the child as controlled by `owner`
    ///
    /// Kubernetes garbage collection deletes the child when the owner goes
    /// away; the operator never deletes children itself.
    pub fn owned_by(mut self, owner: &WildflyAppServer) -> Self {
        self.owner_references
            .push(OwnerReference::controller_of(owner));
        self
    }
}

/// Back-reference from a child resource to its controlling WildflyAppServer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Owner API version
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name
    pub name: String,
    /// Owner UID
    pub uid: String,
    /// This owner is the managing controller
    pub controller: bool,
    /// Foreground deletion of the owner waits for this child
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// Controller reference pointing at `owner`
    pub fn controller_of(owner: &WildflyAppServer) -> Self {
        Self {
            api_version: WildflyAppServer::api_version(&()).into_owned(),
            kind: WildflyAppServer::kind(&()).into_owned(),
            name: owner.name_any(),
            uid: owner.uid().unwrap_or_default(),
            controller: true,
            block_owner_deletion: true,
        }
    }
}

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas
    pub replicas: u32,
    /// Label selector
    pub selector: LabelSelector,
    /// Rollout strategy
    pub strategy: DeploymentStrategy,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Label selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    pub match_labels: BTreeMap<String, String>,
}

/// Deployment strategy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStrategy {
    /// Strategy type: RollingUpdate or Recreate
    #[serde(rename = "type")]
    pub type_: String,
    /// Rolling update config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateConfig>,
}

/// Rolling update configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdateConfig {
    /// Max unavailable pods during a rollout
    pub max_unavailable: u32,
    /// Max pods above the desired count during a rollout
    pub max_surge: u32,
}

/// Pod template spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod metadata (subset of ObjectMeta)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Restart policy
    pub restart_policy: String,
    /// Containers
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

/// Container spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Resource requirements
    pub resources: ResourceRequirements,
    /// Liveness probe
    pub liveness_probe: Probe,
    /// Readiness probe
    pub readiness_probe: Probe,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Environment variable
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Value resolved by the kubelet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    /// Variable with a literal value
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    /// Variable read from a pod field through the downward API
    pub fn from_field(name: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    api_version: "v1".to_string(),
                    field_path: field_path.into(),
                }),
                secret_key_ref: None,
            }),
        }
    }

    /// Variable read from an optional secret key
    pub fn from_optional_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: None,
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.into(),
                    key: key.into(),
                    optional: true,
                }),
            }),
        }
    }
}

/// Source for an environment variable value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    /// Downward API field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<ObjectFieldSelector>,
    /// Secret key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

/// Downward API field selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectFieldSelector {
    /// API version of the field path schema
    pub api_version: String,
    /// Field path, e.g. `metadata.namespace`
    pub field_path: String,
}

/// Secret key selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Key within the secret
    pub key: String,
    /// Missing secret or key does not block pod creation
    pub optional: bool,
}

/// Container port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port name
    pub name: String,
    /// Port number
    pub container_port: u16,
}

/// Resource requirements
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Requests keyed by resource name (cpu, memory)
    pub requests: BTreeMap<String, String>,
}

/// HTTP probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// HTTP GET action
    pub http_get: HttpGetAction,
    /// Seconds before the first probe
    pub initial_delay_seconds: i32,
    /// Probe timeout
    pub timeout_seconds: i32,
    /// Seconds between probes
    pub period_seconds: i32,
    /// Consecutive successes to be considered healthy
    pub success_threshold: i32,
    /// Consecutive failures to be considered unhealthy
    pub failure_threshold: i32,
}

/// HTTP GET action for probe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetAction {
    /// Path
    pub path: String,
    /// Named container port
    pub port: String,
}

/// Volume backed by a ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// ConfigMap source
    pub config_map: ConfigMapVolumeSource,
}

/// ConfigMap volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapVolumeSource {
    /// ConfigMap name
    pub name: String,
    /// Keys projected into the volume
    pub items: Vec<KeyToPath>,
}

/// Projection of one ConfigMap key to a file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyToPath {
    /// ConfigMap key
    pub key: String,
    /// File path inside the volume
    pub path: String,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
    /// Sub path within the volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

/// Service spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type
    #[serde(rename = "type")]
    pub type_: String,
    /// Selector
    pub selector: BTreeMap<String, String>,
    /// Ports
    pub ports: Vec<ServicePort>,
}

/// Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name
    pub name: String,
    /// Port number
    pub port: u16,
}

// =============================================================================
// ConfigMap
// =============================================================================

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Data
    pub data: BTreeMap<String, String>,
}

/// Convert a record into its k8s-openapi wire type
pub fn into_wire<T: DeserializeOwned>(record: &impl Serialize) -> Result<T> {
    let value = serde_json::to_value(record).map_err(|e| Error::serialization(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::WildflyAppServerSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as KubeMeta;

    fn owner() -> WildflyAppServer {
        let mut cr = WildflyAppServer::new(
            "shop",
            WildflyAppServerSpec {
                node_count: 1,
                image: "img:1".to_string(),
                ..Default::default()
            },
        );
        cr.metadata = KubeMeta {
            name: Some("shop".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            ..Default::default()
        };
        cr
    }

    /// Story: Every child points back at its WildflyAppServer so deletion cascades
    #[test]
    fn story_children_are_marked_owned() {
        let meta = ObjectMeta::new("shop", "default").owned_by(&owner());
        assert_eq!(meta.owner_references.len(), 1);

        let owner_ref = &meta.owner_references[0];
        assert_eq!(owner_ref.api_version, "wildfly.banzaicloud.com/v1alpha1");
        assert_eq!(owner_ref.kind, "WildflyAppServer");
        assert_eq!(owner_ref.name, "shop");
        assert_eq!(owner_ref.uid, "uid-1");
        assert!(owner_ref.controller);
    }

    #[test]
    fn story_records_convert_to_wire_types() {
        let cm = ConfigMap {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: ObjectMeta::new("shop", "default").owned_by(&owner()),
            data: BTreeMap::from([("standalone.xml".to_string(), "<server/>".to_string())]),
        };

        let wire: k8s_openapi::api::core::v1::ConfigMap = into_wire(&cm).unwrap();
        assert_eq!(wire.metadata.name.as_deref(), Some("shop"));
        assert_eq!(wire.metadata.owner_references.unwrap()[0].uid, "uid-1");
        assert_eq!(
            wire.data.unwrap().get("standalone.xml").map(String::as_str),
            Some("<server/>")
        );
    }

    #[test]
    fn story_env_var_sources_are_exclusive() {
        let literal = EnvVar::literal("A", "1");
        assert!(literal.value_from.is_none());

        let secret = EnvVar::from_optional_secret("B", "shop", "key");
        let selector = secret.value_from.unwrap().secret_key_ref.unwrap();
        assert!(selector.optional);
        assert_eq!(selector.name, "shop");
    }
}
