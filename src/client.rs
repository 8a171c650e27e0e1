//! Cluster client seam
//!
//! All cluster I/O performed by the reconciler goes through [`ClusterClient`].
//! Owned objects are addressed dynamically through the [`KindRegistry`], so
//! the trait stays object-safe and mockable while callers work with typed
//! k8s-openapi structs via [`ManagedResource`].

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{Limitador, LimitadorStatus};
use crate::registry::{KindRegistry, ResourceKind};
use crate::{Error, FIELD_MANAGER};

/// A typed object kind the operator creates and keeps in sync
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Logical kind used to resolve the API resource
    const KIND: ResourceKind;
}

impl ManagedResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;
}

impl ManagedResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

impl ManagedResource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl ManagedResource for PodDisruptionBudget {
    const KIND: ResourceKind = ResourceKind::PodDisruptionBudget;
}

impl ManagedResource for PersistentVolumeClaim {
    const KIND: ResourceKind = ResourceKind::PersistentVolumeClaim;
}

/// Convert a typed object into its dynamic representation
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}

/// Convert a dynamic object back into a typed one
pub fn from_dynamic<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, Error> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}

/// Trait abstracting the cluster operations used during reconciliation
///
/// This trait allows mocking the cluster in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error>;

    /// Create an object
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Replace an object; the object's resourceVersion guards the write
    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error>;

    /// Delete an object; `Error::NotFound` when it does not exist
    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str)
        -> Result<(), Error>;

    /// List objects matching a label selector
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, Error>;

    /// Apply a JSON merge patch to an object
    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, Error>;

    /// Fetch a secret; `Ok(None)` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Fetch a Limitador instance; `Ok(None)` when it does not exist
    async fn get_limitador(&self, namespace: &str, name: &str)
        -> Result<Option<Limitador>, Error>;

    /// Write the status subresource of a Limitador instance
    ///
    /// The patch carries `resource_version`, so a write based on a stale
    /// read fails with `Error::Conflict`.
    async fn patch_limitador_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: &LimitadorStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Map write failures to the operator's conflict and not-found variants
fn classify(err: kube::Error, kind: &str, name: &str) -> Error {
    match &err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(kind, name),
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(kind, name),
        _ => Error::from(err),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        match self.dynamic_api(resource, namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        debug!(kind = %resource.kind, %namespace, %name, "creating object");
        self.dynamic_api(resource, namespace)
            .create(&post_params(), obj)
            .await
            .map_err(|e| classify(e, &resource.kind, &name))
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        debug!(kind = %resource.kind, %namespace, %name, "updating object");
        self.dynamic_api(resource, namespace)
            .replace(name, &post_params(), obj)
            .await
            .map_err(|e| classify(e, &resource.kind, name))
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        debug!(kind = %resource.kind, %namespace, %name, "deleting object");
        self.dynamic_api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &resource.kind, name))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        let params = ListParams::default().labels(label_selector);
        let list = self.dynamic_api(resource, namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, Error> {
        self.dynamic_api(resource, namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| classify(e, &resource.kind, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_limitador(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Limitador>, Error> {
        let api: Api<Limitador> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_limitador_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: &LimitadorStatus,
    ) -> Result<(), Error> {
        let api: Api<Limitador> = Api::namespaced(self.client.clone(), namespace);

        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status
        });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| classify(e, "Limitador", name))?;

        Ok(())
    }
}

/// Fetch a typed object by name
pub async fn get_typed<K: ManagedResource>(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    namespace: &str,
    name: &str,
) -> Result<Option<K>, Error> {
    let resource = registry.resolve(K::KIND)?;
    match client.get(resource, namespace, name).await? {
        Some(obj) => Ok(Some(from_dynamic(&obj)?)),
        None => Ok(None),
    }
}

/// Delete an object by name, treating an absent object as already deleted
///
/// Returns true if an object was deleted.
pub async fn delete_if_exists(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Result<bool, Error> {
    let resource = registry.resolve(kind)?;
    match client.delete(resource, namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
