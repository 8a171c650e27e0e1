//! Resource merger
//!
//! Each managed kind has a fixed, ordered list of mutators. A mutator looks at
//! one field group, copies the desired value onto the existing object when they
//! differ, and reports whether it changed anything. Fields no mutator inspects
//! are left as the cluster has them, so edits made by other actors survive.
//!
//! [`reconcile_resource`] drives one object through get, create or mutate, and
//! issues at most one write per pass. An unchanged spec therefore produces no
//! writes at all.

mod config_map;
mod deployment;
mod pdb;
mod quantity;
mod service;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::client::{from_dynamic, to_dynamic, ClusterClient, ManagedResource};
use crate::registry::KindRegistry;
use crate::resources::is_tagged_for_deletion;
use crate::Error;

pub use config_map::CONFIG_MAP_MUTATORS;
pub use deployment::DEPLOYMENT_MUTATORS;
pub use pdb::PDB_MUTATORS;
pub use service::SERVICE_MUTATORS;

/// Reconcile one concern of `existing` toward `desired`; true if it changed
pub type Mutator<K> = fn(&K, &mut K) -> bool;

/// Claims are never updated once created
pub const PVC_MUTATORS: &[Mutator<k8s_openapi::api::core::v1::PersistentVolumeClaim>] = &[];

/// What happened to one object during a pass
#[derive(Clone, Debug, PartialEq)]
pub enum Applied<K> {
    /// The object did not exist and was created
    Created(K),
    /// The object existed and drifted; it was updated
    Updated(K),
    /// The object existed and matched
    Unchanged(K),
    /// The object should not exist and was deleted
    Deleted,
    /// The object should not exist and already did not
    Absent,
}

impl<K> Applied<K> {
    /// The object as it now exists in the cluster, if any
    pub fn object(&self) -> Option<&K> {
        match self {
            Applied::Created(k) | Applied::Updated(k) | Applied::Unchanged(k) => Some(k),
            Applied::Deleted | Applied::Absent => None,
        }
    }

    /// True if a write was issued
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            Applied::Created(_) | Applied::Updated(_) | Applied::Deleted
        )
    }
}

/// Copy `desired` into `existing` if they differ
pub(crate) fn sync<T: PartialEq + Clone>(desired: &T, existing: &mut T) -> bool {
    if desired == existing {
        return false;
    }
    *existing = desired.clone();
    true
}

/// Run every mutator; all of them run even after one reports a change
pub fn apply_mutators<K>(desired: &K, existing: &mut K, mutators: &[Mutator<K>]) -> bool {
    mutators
        .iter()
        .fold(false, |changed, mutate| mutate(desired, existing) || changed)
}

/// Get-or-create-or-merge a single object
pub async fn reconcile_resource<K: ManagedResource>(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    desired: &K,
    mutators: &[Mutator<K>],
) -> Result<Applied<K>, Error> {
    let kind = K::KIND;
    let resource = registry.resolve(kind)?;
    let name = desired.name_any();
    let namespace = desired.namespace().ok_or_else(|| {
        Error::internal_with_context("merger", format!("{kind} {name} has no namespace"))
    })?;

    let existing = client.get(resource, &namespace, &name).await?;

    if is_tagged_for_deletion(desired.meta()) {
        return match existing {
            None => Ok(Applied::Absent),
            Some(_) => match client.delete(resource, &namespace, &name).await {
                Ok(()) => {
                    info!(kind = %kind, %namespace, %name, "deleted object");
                    Ok(Applied::Deleted)
                }
                Err(e) if e.is_not_found() => Ok(Applied::Absent),
                Err(e) => Err(e),
            },
        };
    }

    let Some(existing) = existing else {
        let created = client
            .create(resource, &namespace, &to_dynamic(desired)?)
            .await?;
        info!(kind = %kind, %namespace, %name, "created object");
        return Ok(Applied::Created(decode::<K>(&created)?));
    };

    let mut current: K = decode(&existing)?;
    if !apply_mutators(desired, &mut current, mutators) {
        debug!(kind = %kind, %namespace, %name, "object up to date");
        return Ok(Applied::Unchanged(current));
    }

    let updated = client
        .replace(resource, &namespace, &name, &to_dynamic(&current)?)
        .await?;
    info!(kind = %kind, %namespace, %name, "updated object");
    Ok(Applied::Updated(decode::<K>(&updated)?))
}

fn decode<K: ManagedResource>(obj: &DynamicObject) -> Result<K, Error> {
    from_dynamic(obj).map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))
}
