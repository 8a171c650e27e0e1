//! In-memory cluster for multi-pass reconciliation tests
//!
//! [`FakeCluster`] keeps objects in a map keyed by kind, namespace and name,
//! stamps a monotonically increasing resourceVersion on every write, and
//! rejects writes based on a stale version the way the API server does. Every
//! write is recorded so tests can assert on exactly what a pass did.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::{from_dynamic, to_dynamic, ClusterClient};
use crate::crd::{Limitador, LimitadorStatus};
use crate::registry::ResourceKind;
use crate::status::CONDITION_AVAILABLE;
use crate::Error;

type ObjectKey = (String, String, String);

/// One write observed by the fake cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    /// create, replace, delete, patch or status
    pub verb: &'static str,
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    secrets: BTreeMap<(String, String), Secret>,
    limitadors: BTreeMap<(String, String), Limitador>,
    version: u64,
    writes: Vec<Write>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn record(&mut self, verb: &'static str, kind: &str, name: &str) {
        self.writes.push(Write {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
}

/// In-memory stand-in for the API server
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(kind: &str, namespace: &str, name: &str) -> ObjectKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn matches_selector(obj: &DynamicObject, selector: &str) -> bool {
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                map.remove(k);
            } else {
                merge_patch(map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

impl FakeCluster {
    /// Empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an instance as if a user had applied it
    pub fn seed_limitador(&self, mut limitador: Limitador) {
        let mut state = self.state.lock().unwrap();
        limitador.metadata.resource_version = Some(state.next_version());
        let namespace = limitador.metadata.namespace.clone().unwrap_or_default();
        let name = limitador.metadata.name.clone().unwrap_or_default();
        state.limitadors.insert((namespace, name), limitador);
    }

    /// Replace the spec of a stored instance and bump its generation
    pub fn update_limitador(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Limitador)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let limitador = state
            .limitadors
            .get_mut(&(namespace.to_string(), name.to_string()))
            .unwrap();
        edit(limitador);
        limitador.metadata.generation = Some(limitador.metadata.generation.unwrap_or(0) + 1);
        limitador.metadata.resource_version = Some(version);
    }

    /// Remove a stored instance
    pub fn remove_limitador(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .limitadors
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Current stored instance
    pub fn limitador(&self, namespace: &str, name: &str) -> Option<Limitador> {
        self.state
            .lock()
            .unwrap()
            .limitadors
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Store a secret with the given string data
    pub fn seed_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert((namespace.to_string(), name.to_string()), secret);
    }

    /// Store a typed object without recording a write
    pub fn seed<K: Serialize>(&self, kind: ResourceKind, obj: &K) {
        let mut obj = to_dynamic(obj).unwrap();
        let mut state = self.state.lock().unwrap();
        obj.metadata.resource_version = Some(state.next_version());
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();
        let name = obj.metadata.name.clone().unwrap_or_default();
        state
            .objects
            .insert(key(kind.kind_str(), &namespace, &name), obj);
    }

    /// Fetch a stored object as a typed value
    pub fn object<K: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Option<K> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key(kind.kind_str(), namespace, name))
            .map(|obj| from_dynamic(obj).unwrap())
    }

    /// True if an object is stored
    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .objects
            .contains_key(&key(kind.kind_str(), namespace, name))
    }

    /// Set the Available condition the deployment controller would report
    pub fn set_deployment_available(
        &self,
        namespace: &str,
        name: &str,
        available: bool,
        message: &str,
    ) {
        let mut state = self.state.lock().unwrap();
        let obj = state
            .objects
            .get_mut(&key("Deployment", namespace, name))
            .unwrap();
        obj.data["status"] = serde_json::json!({
            "conditions": [{
                "type": CONDITION_AVAILABLE,
                "status": if available { "True" } else { "False" },
                "message": message,
            }]
        });
    }

    /// Writes recorded since the last [`FakeCluster::clear_writes`]
    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&key(&resource.kind, namespace, name))
            .cloned())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let k = key(&resource.kind, namespace, &name);
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&k) {
            return Err(Error::conflict(&resource.kind, name));
        }
        let mut stored = obj.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(k, stored.clone());
        state.record("create", &resource.kind, &name);
        Ok(stored)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let k = key(&resource.kind, namespace, name);
        let mut state = self.state.lock().unwrap();
        let Some(current) = state.objects.get(&k) else {
            return Err(Error::not_found(&resource.kind, name));
        };
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(Error::conflict(&resource.kind, name));
        }
        let mut stored = obj.clone();
        // Status is owned by the workload controllers, not by spec writes.
        if let Some(status) = current.data.get("status").cloned() {
            stored.data["status"] = status;
        }
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(k, stored.clone());
        state.record("replace", &resource.kind, name);
        Ok(stored)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        match state.objects.remove(&key(&resource.kind, namespace, name)) {
            Some(_) => {
                state.record("delete", &resource.kind, name);
                Ok(())
            }
            None => Err(Error::not_found(&resource.kind, name)),
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|((kind, ns, _), obj)| {
                kind == &resource.kind && ns == namespace && matches_selector(obj, label_selector)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, Error> {
        let k = key(&resource.kind, namespace, name);
        let mut state = self.state.lock().unwrap();
        let Some(current) = state.objects.get(&k) else {
            return Err(Error::not_found(&resource.kind, name));
        };
        let mut value = serde_json::to_value(current)?;
        merge_patch(&mut value, patch);
        let mut stored: DynamicObject = serde_json::from_value(value)?;
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(k, stored.clone());
        state.record("patch", &resource.kind, name);
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_limitador(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Limitador>, Error> {
        Ok(self.limitador(namespace, name))
    }

    async fn patch_limitador_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: &LimitadorStatus,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let Some(limitador) = state
            .limitadors
            .get_mut(&(namespace.to_string(), name.to_string()))
        else {
            return Err(Error::not_found("Limitador", name));
        };
        if resource_version.is_some() && resource_version != limitador.metadata.resource_version {
            return Err(Error::conflict("Limitador", name));
        }
        limitador.status = Some(status.clone());
        limitador.metadata.resource_version = Some(version);
        state.record("status", "Limitador", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KindRegistry;
    use k8s_openapi::api::core::v1::ConfigMap;

    fn config_map() -> ConfigMap {
        ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some("cm".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "limitador".to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let registry = KindRegistry::standard();
        let resource = registry.resolve(ResourceKind::ConfigMap).unwrap();
        let cluster = FakeCluster::new();
        cluster.seed(ResourceKind::ConfigMap, &config_map());

        let mut stale = cluster.get(resource, "default", "cm").await.unwrap().unwrap();
        stale.metadata.resource_version = Some("0".to_string());
        let err = cluster
            .replace(resource, "default", "cm", &stale)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_on_labels_and_patch_merges() {
        let registry = KindRegistry::standard();
        let resource = registry.resolve(ResourceKind::ConfigMap).unwrap();
        let cluster = FakeCluster::new();
        cluster.seed(ResourceKind::ConfigMap, &config_map());

        assert_eq!(cluster.list(resource, "default", "app=limitador").await.unwrap().len(), 1);
        assert!(cluster.list(resource, "default", "app=other").await.unwrap().is_empty());

        let patched = cluster
            .patch(
                resource,
                "default",
                "cm",
                &serde_json::json!({"metadata": {"annotations": {"a": "b"}}}),
            )
            .await
            .unwrap();
        assert_eq!(patched.metadata.annotations.unwrap()["a"], "b");
        assert_eq!(patched.metadata.labels.unwrap()["app"], "limitador");
    }
}
