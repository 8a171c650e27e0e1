//! Limits ConfigMap

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::CONFIG_FILE_KEY;
use crate::crd::{Limitador, RateLimit};
use crate::Error;

/// Serialize limits in the format read by the Limitador process
///
/// Order is preserved and an empty list is written as `[]`.
pub fn serialize_limits(limits: &[RateLimit]) -> Result<String, Error> {
    serde_yaml::to_string(limits)
        .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))
}

/// Parse a limits file back into rules
pub fn parse_limits(contents: &str) -> Result<Vec<RateLimit>, Error> {
    serde_yaml::from_str(contents)
        .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))
}

/// Build the ConfigMap holding the limits file
pub fn build_config_map(limitador: &Limitador, metadata: ObjectMeta) -> Result<ConfigMap, Error> {
    let contents = serialize_limits(&limitador.spec.limits)?;

    Ok(ConfigMap {
        metadata,
        data: Some(BTreeMap::from([(CONFIG_FILE_KEY.to_string(), contents)])),
        ..Default::default()
    })
}
