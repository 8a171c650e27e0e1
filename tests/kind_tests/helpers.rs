//! Shared setup for cluster-backed tests

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Client, CustomResourceExt};

use limitador_operator::crd::{Limitador, LimitadorSpec};
use limitador_operator::FIELD_MANAGER;

/// Namespace all integration tests run in
pub const TEST_NAMESPACE: &str = "limitador-operator-test";

/// Connect to the current cluster, install the CRD and create the test namespace
pub async fn ensure_test_cluster() -> Result<Client, Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = Limitador::crd();
    let name = crd.metadata.name.clone().unwrap_or_default();
    crds.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&crd),
    )
    .await?;
    tokio::time::timeout(
        Duration::from_secs(30),
        await_condition(crds, &name, conditions::is_crd_established()),
    )
    .await??;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    if namespaces.get_opt(TEST_NAMESPACE).await?.is_none() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(TEST_NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces.create(&PostParams::default(), &ns).await?;
    }

    Ok(client)
}

/// A Limitador in the test namespace
pub fn sample_limitador(name: &str, spec: LimitadorSpec) -> Limitador {
    let mut limitador = Limitador::new(name, spec);
    limitador.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    limitador
}
