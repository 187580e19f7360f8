//! Desired-state builder
//!
//! Pure functions from a WildflyAppServer to the records of its children.
//! Output depends only on the resource and, for the ConfigMap, the loaded
//! template, so a reconcile can rebuild them on every pass.

use std::collections::BTreeMap;

use kube::ResourceExt;

use super::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, Deployment, DeploymentSpec,
    DeploymentStrategy, EnvVar, HttpGetAction, KeyToPath, LabelSelector, ObjectMeta, PodMeta,
    PodSpec, PodTemplateSpec, Probe, ResourceRequirements, RollingUpdateConfig, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use crate::crd::{ConfigSource, WildflyAppServer};
use crate::template::ConfigRenderer;
use crate::Result;

/// Server configuration file WildFly is started with
pub const SERVER_CONFIG_FILE: &str = "standalone-full-ha-k8s.xml";

/// Canonical location of the server configuration inside the container
pub const CONFIG_MOUNT_PATH: &str =
    "/opt/jboss/wildfly/standalone/configuration/standalone-full-ha-k8s.xml";

/// Volume carrying a pinned configuration
pub const CONFIG_VOLUME_NAME: &str = "config-volume";

/// Key of the rendered configuration inside a generated ConfigMap
pub const GENERATED_CONFIG_KEY: &str = "standalone.xml";

const ADMIN_USER_KEY: &str = "wildfly-admin-user";
const ADMIN_PASSWORD_KEY: &str = "wildfly-admin-password";

/// A rendered ConfigMap together with the source to pin on the resource
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedConfig {
    /// ConfigMap to create
    pub config_map: ConfigMap,
    /// Configuration source pointing at the new ConfigMap
    pub source: ConfigSource,
}

/// Labels shared by the Deployment, its pods and the Service selector
///
/// `appName` is set first so a label of the same name on the resource wins.
pub fn labels(cr: &WildflyAppServer) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(crate::APP_NAME_LABEL.to_string(), cr.name_any());
    labels.extend(cr.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
    labels
}

/// Render labels as a Kubernetes label selector string (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn child_meta(cr: &WildflyAppServer) -> ObjectMeta {
    ObjectMeta::new(cr.name_any(), cr.namespace().unwrap_or_default())
        .with_labels(labels(cr))
        .owned_by(cr)
}

fn http_probe(path: String, timings: [i32; 5]) -> Probe {
    let [
        initial_delay_seconds,
        timeout_seconds,
        period_seconds,
        success_threshold,
        failure_threshold,
    ] = timings;
    Probe {
        http_get: HttpGetAction {
            path,
            port: "http".to_string(),
        },
        initial_delay_seconds,
        timeout_seconds,
        period_seconds,
        success_threshold,
        failure_threshold,
    }
}

/// Build the Deployment running the WildFly nodes
pub fn build_deployment(cr: &WildflyAppServer) -> Deployment {
    let name = cr.name_any();
    let labels = labels(cr);

    let env = vec![
        EnvVar::from_field("KUBERNETES_NAMESPACE", "metadata.namespace"),
        EnvVar::literal("KUBERNETES_LABELS", label_selector(&labels)),
        EnvVar::from_optional_secret("WILDFLY_ADMIN_USER", &name, ADMIN_USER_KEY),
        EnvVar::from_optional_secret("WILDFLY_ADMIN_PASSWORD", &name, ADMIN_PASSWORD_KEY),
    ];

    let ports = [
        ("http", crate::APPLICATION_HTTP_PORT),
        ("management", crate::MANAGEMENT_HTTP_PORT),
        ("jgroups-tcp", crate::JGROUPS_TCP_PORT),
        ("jgroups-tcp-fd", crate::JGROUPS_TCP_FD_PORT),
    ]
    .into_iter()
    .map(|(name, port)| ContainerPort {
        name: name.to_string(),
        container_port: port,
    })
    .collect();

    let (volumes, volume_mounts) = match cr.spec.config_source() {
        Some(source) => (
            vec![Volume {
                name: CONFIG_VOLUME_NAME.to_string(),
                config_map: ConfigMapVolumeSource {
                    name: source.config_map_name,
                    items: vec![KeyToPath {
                        key: source.key,
                        path: SERVER_CONFIG_FILE.to_string(),
                    }],
                },
            }],
            vec![VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                sub_path: Some(SERVER_CONFIG_FILE.to_string()),
            }],
        ),
        None => (Vec::new(), Vec::new()),
    };

    let container = Container {
        name: cr.name_any(),
        image: cr.spec.image.clone(),
        args: vec![format!("--server-config={SERVER_CONFIG_FILE}")],
        env,
        ports,
        resources: ResourceRequirements {
            requests: BTreeMap::from([
                ("cpu".to_string(), "500m".to_string()),
                ("memory".to_string(), "512Mi".to_string()),
            ]),
        },
        liveness_probe: http_probe(format!("/{}", cr.spec.application_path), [60, 5, 60, 1, 6]),
        readiness_probe: http_probe("/".to_string(), [30, 3, 5, 2, 6]),
        volume_mounts,
    };

    Deployment {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        metadata: child_meta(cr),
        spec: DeploymentSpec {
            replicas: cr.spec.node_count,
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            strategy: DeploymentStrategy {
                type_: "RollingUpdate".to_string(),
                rolling_update: Some(RollingUpdateConfig {
                    max_unavailable: 1,
                    max_surge: 1,
                }),
            },
            template: PodTemplateSpec {
                metadata: PodMeta { labels },
                spec: PodSpec {
                    restart_policy: "Always".to_string(),
                    containers: vec![container],
                    volumes,
                },
            },
        },
    }
}

/// Build the LoadBalancer Service exposing the application and management ports
pub fn build_service(cr: &WildflyAppServer) -> Service {
    Service {
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        metadata: child_meta(cr),
        spec: ServiceSpec {
            type_: "LoadBalancer".to_string(),
            selector: labels(cr),
            ports: vec![
                ServicePort {
                    name: "http".to_string(),
                    port: crate::APPLICATION_HTTP_PORT,
                },
                ServicePort {
                    name: "management".to_string(),
                    port: crate::MANAGEMENT_HTTP_PORT,
                },
            ],
        },
    }
}

/// Build the generated configuration ConfigMap
///
/// Returns `Ok(None)` when the resource declares no datasources or already
/// pins a ConfigMap. Render failures are returned and nothing is built.
pub fn build_config_map(
    cr: &WildflyAppServer,
    renderer: &ConfigRenderer,
) -> Result<Option<GeneratedConfig>> {
    if !cr.spec.needs_generated_config() {
        return Ok(None);
    }
    let datasources = cr
        .spec
        .data_source_config
        .as_ref()
        .map(|config| config.normalized())
        .unwrap_or_default();

    let name = cr.name_any();
    let document = renderer.render(&name, &datasources)?;

    let mut meta = child_meta(cr);
    meta.labels = BTreeMap::from([(crate::APP_NAME_LABEL.to_string(), name.clone())]);

    Ok(Some(GeneratedConfig {
        config_map: ConfigMap {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: meta,
            data: BTreeMap::from([(GENERATED_CONFIG_KEY.to_string(), document)]),
        },
        source: ConfigSource {
            config_map_name: name,
            key: GENERATED_CONFIG_KEY.to_string(),
        },
    }))
}
