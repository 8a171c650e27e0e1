//! Config version propagation
//!
//! Stamps every running replica with the resourceVersion of the limits
//! ConfigMap it should be serving, so an observer can tell when a limits
//! change has reached all pods without reading the mounted file.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::debug;

use crate::client::ClusterClient;
use crate::registry::{KindRegistry, ResourceKind};
use crate::resources::{label_selector, CONFIG_VERSION_ANNOTATION};
use crate::Error;

/// Annotate every pod of an instance with the ConfigMap resourceVersion
///
/// Pods already carrying the current version are skipped. Returns the number
/// of pods patched.
pub async fn propagate_config_version(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    namespace: &str,
    instance: &str,
    config_map: &ConfigMap,
) -> Result<usize, Error> {
    let Some(version) = config_map.resource_version() else {
        return Ok(0);
    };

    let pods_resource = registry.resolve(ResourceKind::Pod)?;
    let pods = client
        .list(pods_resource, namespace, &label_selector(instance))
        .await?;

    let patch = serde_json::json!({
        "metadata": { "annotations": { CONFIG_VERSION_ANNOTATION: version } }
    });

    let mut patched = 0;
    for pod in pods {
        if pod.annotations().get(CONFIG_VERSION_ANNOTATION) == Some(&version) {
            continue;
        }
        let pod_name = pod.name_any();
        match client
            .patch(pods_resource, namespace, &pod_name, &patch)
            .await
        {
            Ok(_) => patched += 1,
            // Pod went away between list and patch.
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }

    if patched > 0 {
        debug!(limitador = %instance, %version, patched, "propagated config version to pods");
    }
    Ok(patched)
}
