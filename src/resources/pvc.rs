//! Counter volume claim for disk storage

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::tag_for_deletion;
use crate::crd::{Limitador, StorageMode};
use crate::storage::StorageStrategy;

/// Storage request used when the spec does not set one
pub const DEFAULT_PVC_SIZE: &str = "1Gi";

/// Build the claim, tagged for deletion unless storage is on disk
pub fn build_pvc(
    limitador: &Limitador,
    storage: &StorageStrategy,
    mut metadata: ObjectMeta,
) -> PersistentVolumeClaim {
    if storage.mode != StorageMode::Disk {
        tag_for_deletion(&mut metadata);
        return PersistentVolumeClaim {
            metadata,
            ..Default::default()
        };
    }

    let claim = limitador
        .spec
        .storage
        .as_ref()
        .and_then(|s| s.disk.as_ref())
        .and_then(|d| d.persistent_volume_claim.clone())
        .unwrap_or_default();

    let size = claim
        .resources
        .map(|r| r.requests)
        .unwrap_or_else(|| Quantity(DEFAULT_PVC_SIZE.to_string()));

    PersistentVolumeClaim {
        metadata,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: claim.storage_class_name,
            volume_name: claim.volume_name,
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), size)])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
