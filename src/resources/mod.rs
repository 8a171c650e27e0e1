//! Desired state builder
//!
//! Computes every owned object from an instance spec and its resolved storage
//! strategy. Nothing here talks to the cluster: the same inputs always yield
//! the same objects, and a desired object is never stored, only applied.

mod config_map;
mod deployment;
mod pdb;
mod pvc;
mod service;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::config::OperatorConfig;
use crate::crd::{Limitador, Ports, ServiceStatus};
use crate::storage::StorageStrategy;
use crate::Error;

pub use config_map::{build_config_map, parse_limits, serialize_limits};
pub use deployment::{build_command, build_deployment};
pub use pdb::build_pdb;
pub use pvc::{build_pvc, DEFAULT_PVC_SIZE};
pub use service::build_service;

/// Key of the limits file inside the ConfigMap
pub const CONFIG_FILE_KEY: &str = "limitador-config.yaml";

/// Directory the ConfigMap is mounted at
pub const CONFIG_MOUNT_PATH: &str = "/home/limitador/etc";

/// Full path of the limits file inside the container
pub const CONFIG_FILE_PATH: &str = "/home/limitador/etc/limitador-config.yaml";

/// Name of the ConfigMap volume
pub const CONFIG_VOLUME_NAME: &str = "config-file";

/// Name of the Limitador container
pub const CONTAINER_NAME: &str = "limitador";

/// Label identifying the application
pub const LABEL_APP: &str = "app";

/// Value of the application label
pub const APP_NAME: &str = "limitador";

/// Label identifying the owning instance
pub const LABEL_RESOURCE: &str = "limitador-resource";

/// Label identifying the managing operator
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Annotation marking a desired object as "must not exist"
pub const DELETE_ANNOTATION: &str = "limitador.kuadrant.io/delete";

/// Pod annotation carrying the applied ConfigMap resourceVersion
pub const CONFIG_VERSION_ANNOTATION: &str = "limitador.kuadrant.io/config-version";

const NAME_PREFIX: &str = "limitador";

/// Deployment name for an instance
pub fn deployment_name(instance: &str) -> String {
    format!("{NAME_PREFIX}-{instance}")
}

/// Service name for an instance
pub fn service_name(instance: &str) -> String {
    format!("{NAME_PREFIX}-{instance}")
}

/// PodDisruptionBudget name for an instance
pub fn pdb_name(instance: &str) -> String {
    format!("{NAME_PREFIX}-{instance}")
}

/// PersistentVolumeClaim name for an instance
pub fn pvc_name(instance: &str) -> String {
    format!("{NAME_PREFIX}-{instance}")
}

/// Limits ConfigMap name for an instance
pub fn config_map_name(instance: &str) -> String {
    format!("limits-config-{instance}")
}

/// Deployment name used by earlier releases
pub fn legacy_deployment_name(instance: &str) -> String {
    instance.to_string()
}

/// ConfigMap name used by earlier releases
pub fn legacy_config_map_name(instance: &str) -> String {
    instance.to_string()
}

/// In-cluster DNS name of the instance's service
pub fn service_host(instance: &str, namespace: &str) -> String {
    format!("{}.{namespace}.svc.cluster.local", service_name(instance))
}

/// Service descriptor published in status
pub fn service_status(limitador: &Limitador) -> ServiceStatus {
    let listener = limitador.spec.listener();
    ServiceStatus {
        host: service_host(
            &limitador.name_any(),
            &limitador.namespace().unwrap_or_default(),
        ),
        ports: Ports {
            http: listener.http_port(),
            grpc: listener.grpc_port(),
        },
    }
}

/// Labels that select an instance's pods
pub fn selector_labels(instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), APP_NAME.to_string()),
        (LABEL_RESOURCE.to_string(), instance.to_string()),
    ])
}

/// Label selector string matching an instance's pods
pub fn label_selector(instance: &str) -> String {
    selector_labels(instance)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn object_labels(instance: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(instance);
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        crate::FIELD_MANAGER.to_string(),
    );
    labels
}

/// Controller owner reference pointing at the instance
pub fn owner_reference(limitador: &Limitador) -> Result<OwnerReference, Error> {
    let name = limitador.name_any();
    let uid = limitador.uid().ok_or_else(|| {
        Error::internal_with_context("desired-state", format!("Limitador {name} has no uid"))
    })?;

    Ok(OwnerReference {
        api_version: Limitador::api_version(&()).to_string(),
        kind: Limitador::kind(&()).to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// True if `meta` carries an owner reference to the given uid
pub fn is_owned_by(meta: &ObjectMeta, uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
}

/// Metadata shared by every owned object
fn object_meta(limitador: &Limitador, name: String) -> Result<ObjectMeta, Error> {
    Ok(ObjectMeta {
        name: Some(name),
        namespace: limitador.namespace(),
        labels: Some(object_labels(&limitador.name_any())),
        owner_references: Some(vec![owner_reference(limitador)?]),
        ..Default::default()
    })
}

/// Mark a desired object as one that must not exist
pub fn tag_for_deletion(meta: &mut ObjectMeta) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(DELETE_ANNOTATION.to_string(), "true".to_string());
}

/// True if the desired object was tagged for deletion
pub fn is_tagged_for_deletion(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(DELETE_ANNOTATION))
        .is_some_and(|v| v == "true")
}

/// Every object an instance should own, computed from its spec
#[derive(Clone, Debug)]
pub struct DesiredState {
    /// The Limitador workload
    pub deployment: Deployment,
    /// Network endpoint for both listeners
    pub service: Service,
    /// Limits file
    pub config_map: ConfigMap,
    /// Disruption budget, tagged for deletion when not requested
    pub pdb: PodDisruptionBudget,
    /// Counter volume, tagged for deletion unless storage is on disk
    pub pvc: PersistentVolumeClaim,
}

/// Build the full desired state for an instance
///
/// Fails on an inconsistent spec before any object is produced.
pub fn build_desired(
    limitador: &Limitador,
    storage: &StorageStrategy,
    config: &OperatorConfig,
) -> Result<DesiredState, Error> {
    let name = limitador.name_any();
    limitador.spec.validate(&name)?;

    Ok(DesiredState {
        deployment: build_deployment(
            limitador,
            storage,
            config,
            object_meta(limitador, deployment_name(&name))?,
        ),
        service: build_service(limitador, object_meta(limitador, service_name(&name))?),
        config_map: build_config_map(limitador, object_meta(limitador, config_map_name(&name))?)?,
        pdb: build_pdb(limitador, object_meta(limitador, pdb_name(&name))?),
        pvc: build_pvc(limitador, storage, object_meta(limitador, pvc_name(&name))?),
    })
}
