//! Upgrade migrator
//!
//! Earlier releases named the Deployment and the limits ConfigMap after the
//! instance itself. The current names carry a prefix. Once the prefixed
//! Deployment reports Available the legacy pair is deleted; until then it is
//! left alone so capacity never drops during the cutover.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::client::{delete_if_exists, get_typed, ClusterClient};
use crate::crd::Limitador;
use crate::registry::{KindRegistry, ResourceKind};
use crate::resources::{
    deployment_name, is_owned_by, legacy_config_map_name, legacy_deployment_name,
};
use crate::status::is_deployment_available;
use crate::Error;

/// Result of one migration step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy objects owned by this instance exist
    NotNeeded,
    /// Legacy objects were deleted
    Completed,
    /// Legacy objects exist but the replacement is not ready yet
    Retry(String),
}

/// Run one step of the legacy-name migration for an instance
pub async fn migrate_legacy_resources(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    limitador: &Limitador,
) -> Result<MigrationOutcome, Error> {
    let name = limitador.name_any();
    let namespace = limitador.namespace().unwrap_or_default();
    let Some(uid) = limitador.uid() else {
        return Ok(MigrationOutcome::NotNeeded);
    };

    let legacy_deployment = legacy_deployment_name(&name);
    let legacy_config_map = legacy_config_map_name(&name);

    let has_legacy_deployment =
        get_typed::<Deployment>(client, registry, &namespace, &legacy_deployment)
            .await?
            .is_some_and(|d| is_owned_by(&d.metadata, &uid));
    let has_legacy_config_map =
        get_typed::<ConfigMap>(client, registry, &namespace, &legacy_config_map)
            .await?
            .is_some_and(|cm| is_owned_by(&cm.metadata, &uid));

    if !has_legacy_deployment && !has_legacy_config_map {
        return Ok(MigrationOutcome::NotNeeded);
    }

    let current_name = deployment_name(&name);
    let Some(current) =
        get_typed::<Deployment>(client, registry, &namespace, &current_name).await?
    else {
        debug!(limitador = %name, "replacement deployment not created yet");
        return Ok(MigrationOutcome::Retry(format!(
            "deployment {current_name} does not exist yet"
        )));
    };

    if !is_deployment_available(&current) {
        debug!(limitador = %name, "replacement deployment not available yet");
        return Ok(MigrationOutcome::Retry(format!(
            "deployment {current_name} is not available yet"
        )));
    }

    if has_legacy_deployment {
        delete_if_exists(
            client,
            registry,
            ResourceKind::Deployment,
            &namespace,
            &legacy_deployment,
        )
        .await?;
    }
    if has_legacy_config_map {
        delete_if_exists(
            client,
            registry,
            ResourceKind::ConfigMap,
            &namespace,
            &legacy_config_map,
        )
        .await?;
    }

    info!(limitador = %name, %namespace, "removed legacy deployment and config map");
    Ok(MigrationOutcome::Completed)
}
