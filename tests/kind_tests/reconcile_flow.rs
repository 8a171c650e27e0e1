//! Integration tests for the reconcile pass against a live API server
//!
//! The controller loop is not started; each test drives `reconcile` directly
//! so the outcome of a single pass can be inspected.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use limitador_operator::config::OperatorConfig;
use limitador_operator::controller::{reconcile, Context};
use limitador_operator::crd::{DiskStorage, Limitador, LimitadorSpec, Storage, CONDITION_READY};
use limitador_operator::resources::{parse_limits, CONFIG_FILE_KEY};

use super::helpers::{ensure_test_cluster, sample_limitador, TEST_NAMESPACE};

async fn create(client: &Client, name: &str, spec: LimitadorSpec) -> Limitador {
    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
    api.create(&PostParams::default(), &sample_limitador(name, spec))
        .await
        .expect("failed to create Limitador")
}

async fn pass(client: &Client, name: &str) {
    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let limitador = api.get(name).await.expect("failed to get Limitador");
    let ctx = Arc::new(Context::new(client.clone(), OperatorConfig::default()));
    reconcile(Arc::new(limitador), ctx)
        .await
        .expect("reconcile failed");
}

/// Story: one pass materializes every owned object
///
/// After the first pass the workload, its service and the limits file exist
/// under their prefixed names, and the instance reports a Ready condition.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_first_pass_creates_owned_objects() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "flow-create";
    create(&client, name, LimitadorSpec::default()).await;

    pass(&client, name).await;

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let services: Api<Service> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    assert!(deployments.get_opt("limitador-flow-create").await.unwrap().is_some());
    assert!(services.get_opt("limitador-flow-create").await.unwrap().is_some());
    let config_map = config_maps
        .get("limits-config-flow-create")
        .await
        .expect("limits ConfigMap missing");
    let limits = parse_limits(&config_map.data.unwrap()[CONFIG_FILE_KEY]).unwrap();
    assert!(limits.is_empty());

    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let status = api.get(name).await.unwrap().status.unwrap();
    assert!(status.get_condition(CONDITION_READY).is_some());
    assert_eq!(status.observed_generation, Some(1));

    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Story: moving to disk storage brings a claim and a Recreate rollout
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_disk_storage_recreates() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "flow-disk";
    let spec = LimitadorSpec {
        storage: Some(Storage {
            disk: Some(DiskStorage::default()),
            ..Default::default()
        }),
        ..Default::default()
    };
    create(&client, name, spec).await;

    pass(&client, name).await;

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let claims: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let deployment = deployments.get("limitador-flow-disk").await.unwrap();
    let strategy = deployment.spec.unwrap().strategy.unwrap();
    assert_eq!(strategy.type_.as_deref(), Some("Recreate"));
    assert!(claims.get_opt("limitador-flow-disk").await.unwrap().is_some());

    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}
