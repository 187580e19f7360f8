//! Integration tests for CRD operations
//!
//! These tests tell the story of how application teams interact with
//! WildflyAppServer resources through the Kubernetes API.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::ResourceExt;

use wildfly_operator::crd::{
    DataSourceConfig, DataSourceSpec, NamedDataSource, WildflyAppServer,
};

use super::helpers::{cleanup_server, ensure_test_cluster, sample_server, TEST_NAMESPACE};

/// Story: A team declares a three node WildFly cluster
///
/// Expected behavior:
/// - The resource is persisted with its node count and image
/// - No status is present until the operator reconciles it
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_team_creates_application_server() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-create";
    cleanup_server(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_server(name, 3))
        .await
        .expect("failed to create application server");

    assert_eq!(created.name_any(), name);
    assert_eq!(created.spec.node_count, 3);
    assert_eq!(created.spec.image, "jboss/wildfly:14.0.1.Final");
    assert!(created.status.is_none());

    cleanup_server(&client, name).await;
}

/// Story: Datasources declared in list form survive a round trip through the API
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_datasources_round_trip_through_the_api() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-datasources";
    cleanup_server(&client, name).await;

    let mut server = sample_server(name, 1);
    server.spec.data_source_config = Some(DataSourceConfig::Listed(vec![NamedDataSource {
        name: "orders".to_string(),
        spec: DataSourceSpec {
            host_name: "mysql".to_string(),
            database_name: "orders".to_string(),
            jndi_name: "java:jboss/datasources/OrdersDS".to_string(),
            user: Some("shop".to_string()),
            password: None,
        },
    }]));
    api.create(&PostParams::default(), &server)
        .await
        .expect("failed to create application server");

    let fetched = api.get(name).await.expect("failed to read back");
    let datasources = fetched
        .spec
        .data_source_config
        .expect("datasources should be persisted")
        .normalized();
    assert_eq!(datasources.len(), 1);
    assert_eq!(datasources[0].name, "orders");

    cleanup_server(&client, name).await;
}

/// Story: A team scales its cluster by editing the node count
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_team_scales_application_server() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<WildflyAppServer> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-scale";
    cleanup_server(&client, name).await;

    api.create(&PostParams::default(), &sample_server(name, 1))
        .await
        .expect("failed to create application server");

    let patch = serde_json::json!({ "spec": { "nodeCount": 4 } });
    let patched = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("failed to patch node count");
    assert_eq!(patched.spec.node_count, 4);

    cleanup_server(&client, name).await;
}
