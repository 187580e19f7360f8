//! Integration tests for the reconciler
//!
//! These tests run single reconcile passes against a real API server and
//! check the children and status the operator leaves behind.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;

use wildfly_operator::config::{AddressDiscovery, OperatorConfig};
use wildfly_operator::controller::{reconcile, Context};
use wildfly_operator::crd::{DataSourceConfig, DataSourceSpec, WildflyAppServer};

use super::helpers::{cleanup_server, ensure_test_cluster, sample_server, TEST_NAMESPACE};

fn test_context(client: kube::Client) -> Arc<Context> {
    // Watch mode keeps background address polls out of the test
    let config = OperatorConfig {
        namespace: Some(TEST_NAMESPACE.to_string()),
        address_discovery: AddressDiscovery::Watch,
        ..Default::default()
    };
    Arc::new(Context::builder(client).config(config).build())
}

/// Story: The operator brings a new resource up to its declared shape
///
/// Expected behavior:
/// - A Deployment with the declared replica count is created
/// - A LoadBalancer Service exposing http and management is created
/// - Both are owned by the resource so deletion cascades
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_reconcile_creates_deployment_and_service() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "reconcile-create";
    cleanup_server(&client, name).await;

    let server = api
        .create(&PostParams::default(), &sample_server(name, 2))
        .await
        .expect("failed to create application server");

    let ctx = test_context(client.clone());
    let action = reconcile(Arc::new(server), ctx)
        .await
        .expect("reconcile should succeed");
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployment = deployments.get(name).await.expect("deployment exists");
    let spec = deployment.spec.expect("deployment spec");
    assert_eq!(spec.replicas, Some(2));
    let owners = deployment.metadata.owner_references.unwrap_or_default();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "WildflyAppServer");

    let services: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let service = services.get(name).await.expect("service exists");
    let spec = service.spec.expect("service spec");
    assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
    let port_names: Vec<_> = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.name)
        .collect();
    assert_eq!(port_names, vec!["http", "management"]);

    cleanup_server(&client, name).await;
}

/// Story: Raising the node count scales the existing Deployment
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_reconcile_scales_existing_deployment() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "reconcile-scale";
    cleanup_server(&client, name).await;

    let server = api
        .create(&PostParams::default(), &sample_server(name, 1))
        .await
        .expect("failed to create application server");
    let ctx = test_context(client.clone());
    reconcile(Arc::new(server), ctx.clone())
        .await
        .expect("first reconcile should succeed");

    let mut scaled = api.get(name).await.expect("resource exists");
    scaled.spec.node_count = 3;
    reconcile(Arc::new(scaled), ctx)
        .await
        .expect("second reconcile should succeed");

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployment = deployments.get(name).await.expect("deployment exists");
    assert_eq!(deployment.spec.and_then(|s| s.replicas), Some(3));

    cleanup_server(&client, name).await;
}

/// Story: Declaring datasources produces a generated configuration
///
/// Expected behavior:
/// - A ConfigMap named after the resource holds the rendered standalone.xml
/// - The resource is pinned to that ConfigMap so later edits are left alone
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_datasources_generate_and_pin_configuration() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "reconcile-config";
    cleanup_server(&client, name).await;

    let mut server = sample_server(name, 1);
    server.spec.data_source_config = Some(DataSourceConfig::Named(
        [(
            "orders".to_string(),
            DataSourceSpec {
                host_name: "mysql".to_string(),
                database_name: "orders".to_string(),
                jndi_name: "java:jboss/datasources/OrdersDS".to_string(),
                user: Some("shop".to_string()),
                password: Some("secret".to_string()),
            },
        )]
        .into_iter()
        .collect(),
    ));
    let server = api
        .create(&PostParams::default(), &server)
        .await
        .expect("failed to create application server");

    reconcile(Arc::new(server), test_context(client.clone()))
        .await
        .expect("reconcile should succeed");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let config_map = config_maps.get(name).await.expect("config map exists");
    let rendered = config_map
        .data
        .and_then(|mut data| data.remove("standalone.xml"))
        .expect("rendered configuration");
    assert!(rendered.contains("java:jboss/datasources/OrdersDS"));

    let pinned = api.get(name).await.expect("resource exists");
    assert_eq!(pinned.spec.config_map_name.as_deref(), Some(name));
    assert_eq!(
        pinned.spec.standalone_config_key.as_deref(),
        Some("standalone.xml")
    );

    cleanup_server(&client, name).await;
}
