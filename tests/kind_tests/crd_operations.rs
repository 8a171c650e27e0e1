//! Integration tests for CRD operations
//!
//! These tests tell the story of how users interact with Limitador resources
//! through the Kubernetes API.

use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;

use limitador_operator::crd::{
    DiskStorage, Limitador, LimitadorSpec, RateLimit, RateLimitHeaders, Storage,
};

use super::helpers::{ensure_test_cluster, sample_limitador, TEST_NAMESPACE};

async fn cleanup(client: &Client, name: &str) {
    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

fn sample_limit() -> RateLimit {
    RateLimit {
        conditions: vec!["req.method == 'GET'".to_string()],
        max_value: 5,
        namespace: "toystore".to_string(),
        seconds: 10,
        variables: vec![],
        name: Some("get-limit".to_string()),
    }
}

/// Story: a user declares a rate limiter with limits and disk storage
///
/// Every optional field the user set is returned as written, and the ones
/// they left out stay absent rather than being filled with zero values.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_creates_limitador() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-create";
    cleanup(&client, name).await;

    let spec = LimitadorSpec {
        limits: vec![sample_limit()],
        storage: Some(Storage {
            disk: Some(DiskStorage::default()),
            ..Default::default()
        }),
        rate_limit_headers: Some(RateLimitHeaders::DraftVersion03),
        ..Default::default()
    };
    api.create(&PostParams::default(), &sample_limitador(name, spec))
        .await
        .expect("failed to create Limitador");

    let fetched = api.get(name).await.expect("failed to get Limitador");
    assert_eq!(fetched.spec.limits, vec![sample_limit()]);
    assert!(fetched.spec.storage.unwrap().disk.is_some());
    assert_eq!(
        fetched.spec.rate_limit_headers,
        Some(RateLimitHeaders::DraftVersion03)
    );
    assert!(fetched.spec.replicas.is_none());
    assert!(fetched.spec.resource_requirements.is_none());

    cleanup(&client, name).await;
}

/// Story: a user scales an existing rate limiter
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_user_updates_replicas() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Limitador> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-update";
    cleanup(&client, name).await;

    api.create(
        &PostParams::default(),
        &sample_limitador(name, LimitadorSpec::default()),
    )
    .await
    .expect("failed to create Limitador");

    let patch = serde_json::json!({ "spec": { "replicas": 3 } });
    let updated = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("failed to patch Limitador");
    assert_eq!(updated.spec.replicas(), 3);
    assert_eq!(updated.metadata.generation, Some(2));

    cleanup(&client, name).await;
}
