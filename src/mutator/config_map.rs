//! ConfigMap mutators

use k8s_openapi::api::core::v1::ConfigMap;

use super::{sync, Mutator};

/// Ordered mutators for the limits ConfigMap
pub const CONFIG_MAP_MUTATORS: &[Mutator<ConfigMap>] = &[data];

fn data(desired: &ConfigMap, existing: &mut ConfigMap) -> bool {
    sync(&desired.data, &mut existing.data)
}
