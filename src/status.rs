//! Status aggregator
//!
//! Derives the Ready condition of an instance from the outcome of the spec
//! pass and the health reported by its Deployment, then writes status back
//! only when something a reader could observe has changed.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::client::{get_typed, ClusterClient};
use crate::crd::{Condition, ConditionStatus, Limitador, LimitadorStatus, CONDITION_READY};
use crate::registry::KindRegistry;
use crate::resources::{deployment_name, service_status};
use crate::Error;

/// Deployment condition type reporting availability
pub const CONDITION_AVAILABLE: &str = "Available";

/// Ready reason when the instance is serving
pub const REASON_READY: &str = "Ready";

/// Ready reason when the Deployment is missing or unavailable
pub const REASON_NOT_AVAILABLE: &str = "NotAvailable";

/// Ready reason when the spec could not be applied
pub const REASON_RECONCILIATION_ERROR: &str = "ReconciliationError";

/// Ready message when the instance is serving
pub const MESSAGE_READY: &str = "Limitador is ready";

/// Ready message when the Deployment has no availability condition
pub const MESSAGE_AVAILABLE_NOT_FOUND: &str = "Available condition not found";

/// What was observed about the owned Deployment
#[derive(Debug)]
pub enum WorkloadHealth<'a> {
    /// The Deployment exists
    Found(&'a Deployment),
    /// The Deployment does not exist
    Missing(String),
}

/// Find the Available condition of a Deployment
pub fn available_condition(deployment: &Deployment) -> Option<&DeploymentCondition> {
    deployment
        .status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == CONDITION_AVAILABLE)
}

/// True if the Deployment reports Available=True
pub fn is_deployment_available(deployment: &Deployment) -> bool {
    available_condition(deployment).is_some_and(|c| c.status == "True")
}

/// Compute the Ready condition
///
/// A spec-pass error takes precedence over anything observed on the
/// Deployment.
pub fn ready_condition(spec_error: Option<&Error>, workload: &WorkloadHealth<'_>) -> Condition {
    let not_ready = |reason: &str, message: String| {
        Condition::new(CONDITION_READY, ConditionStatus::False, reason, message)
    };

    if let Some(err) = spec_error {
        return not_ready(REASON_RECONCILIATION_ERROR, err.to_string());
    }

    let deployment = match workload {
        WorkloadHealth::Missing(message) => {
            return not_ready(REASON_NOT_AVAILABLE, message.clone())
        }
        WorkloadHealth::Found(deployment) => deployment,
    };

    match available_condition(deployment) {
        None => not_ready(REASON_NOT_AVAILABLE, MESSAGE_AVAILABLE_NOT_FOUND.to_string()),
        Some(c) if c.status != "True" => {
            not_ready(REASON_NOT_AVAILABLE, c.message.clone().unwrap_or_default())
        }
        Some(_) => Condition::new(
            CONDITION_READY,
            ConditionStatus::True,
            REASON_READY,
            MESSAGE_READY,
        ),
    }
}

/// Compute the full status from scratch, keeping condition history
pub fn compute_status(
    limitador: &Limitador,
    spec_error: Option<&Error>,
    workload: &WorkloadHealth<'_>,
) -> LimitadorStatus {
    let previous_conditions = limitador
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();

    LimitadorStatus {
        conditions: previous_conditions,
        ..Default::default()
    }
    .observed_generation(limitador.metadata.generation)
    .service(service_status(limitador))
    .condition(ready_condition(spec_error, workload))
}

/// True if `computed` differs from what is stored
///
/// Conditions are compared without timestamps; an unchanged condition keeps
/// its stored transition time so this is only a guard against clock noise.
pub fn status_changed(stored: Option<&LimitadorStatus>, computed: &LimitadorStatus) -> bool {
    let Some(stored) = stored else {
        return true;
    };

    if stored.observed_generation != computed.observed_generation
        || stored.service != computed.service
        || stored.conditions.len() != computed.conditions.len()
    {
        return true;
    }

    computed.conditions.iter().any(|c| {
        stored
            .conditions
            .iter()
            .find(|s| s.type_ == c.type_)
            .is_none_or(|s| !s.same_state(c))
    })
}

/// Recompute and, if changed, write the status of an instance
///
/// Returns true if a write was issued. A concurrent edit surfaces as
/// `Error::Conflict`.
pub async fn update_status(
    client: &dyn ClusterClient,
    registry: &KindRegistry,
    limitador: &Limitador,
    spec_error: Option<&Error>,
) -> Result<bool, Error> {
    let name = limitador.name_any();
    let namespace = limitador.namespace().unwrap_or_default();
    let deployment_name = deployment_name(&name);

    // A failed lookup is reported like a spec-pass error.
    let (deployment, lookup_error) =
        match get_typed::<Deployment>(client, registry, &namespace, &deployment_name).await {
            Ok(d) => (d, None),
            Err(e) => (None, Some(e)),
        };
    let spec_error = spec_error.or(lookup_error.as_ref());
    let workload = match &deployment {
        Some(d) => WorkloadHealth::Found(d),
        None => WorkloadHealth::Missing(
            Error::not_found("Deployment", format!("{namespace}/{deployment_name}")).to_string(),
        ),
    };

    let computed = compute_status(limitador, spec_error, &workload);
    if !status_changed(limitador.status.as_ref(), &computed) {
        debug!(limitador = %name, "status unchanged");
        return Ok(false);
    }

    client
        .patch_limitador_status(
            &namespace,
            &name,
            limitador.resource_version(),
            &computed,
        )
        .await?;

    info!(
        limitador = %name,
        ready = computed.is_ready(),
        "status updated"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LimitadorSpec;
    use crate::resources::fixtures::sample_limitador;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn deployment_with(condition: Option<(&str, &str)>) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: condition.map(|(status, message)| {
                    vec![DeploymentCondition {
                        type_: CONDITION_AVAILABLE.to_string(),
                        status: status.to_string(),
                        message: Some(message.to_string()),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    // =========================================================================
    // Ready condition
    // =========================================================================

    #[test]
    fn test_spec_error_takes_precedence() {
        let available = deployment_with(Some(("True", "ok")));
        let err = Error::configuration("missing secret reference");
        let c = ready_condition(Some(&err), &WorkloadHealth::Found(&available));
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, REASON_RECONCILIATION_ERROR);
        assert!(c.message.contains("missing secret reference"));
    }

    #[test]
    fn test_missing_deployment() {
        let message = Error::not_found("Deployment", "default/limitador-rl").to_string();
        let c = ready_condition(None, &WorkloadHealth::Missing(message.clone()));
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, REASON_NOT_AVAILABLE);
        assert_eq!(c.message, message);
        assert!(c.message.contains("not found"));
    }

    #[test]
    fn test_no_available_condition() {
        let d = deployment_with(None);
        let c = ready_condition(None, &WorkloadHealth::Found(&d));
        assert_eq!(c.reason, REASON_NOT_AVAILABLE);
        assert_eq!(c.message, MESSAGE_AVAILABLE_NOT_FOUND);
    }

    /// Story: the child's own words reach the user
    #[test]
    fn story_unavailable_message_is_passed_through() {
        let d = deployment_with(Some((
            "False",
            "Deployment does not have minimum availability.",
        )));
        let c = ready_condition(None, &WorkloadHealth::Found(&d));
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.message, "Deployment does not have minimum availability.");
    }

    #[test]
    fn test_available_is_ready() {
        let d = deployment_with(Some(("True", "ok")));
        let c = ready_condition(None, &WorkloadHealth::Found(&d));
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.reason, REASON_READY);
        assert_eq!(c.message, MESSAGE_READY);
        assert!(is_deployment_available(&d));
    }

    // =========================================================================
    // Change detection
    // =========================================================================

    #[test]
    fn test_recomputed_status_is_unchanged() {
        let d = deployment_with(Some(("True", "ok")));
        let mut limitador = sample_limitador("rl", LimitadorSpec::default());
        let first = compute_status(&limitador, None, &WorkloadHealth::Found(&d));
        limitador.status = Some(first.clone());

        let second = compute_status(&limitador, None, &WorkloadHealth::Found(&d));
        assert!(!status_changed(limitador.status.as_ref(), &second));
        assert_eq!(
            first.conditions[0].last_transition_time,
            second.conditions[0].last_transition_time
        );
    }

    #[test]
    fn test_stale_generation_forces_write() {
        let d = deployment_with(Some(("True", "ok")));
        let mut limitador = sample_limitador("rl", LimitadorSpec::default());
        limitador.status = Some(compute_status(&limitador, None, &WorkloadHealth::Found(&d)));
        limitador.metadata.generation = Some(2);

        let computed = compute_status(&limitador, None, &WorkloadHealth::Found(&d));
        assert!(status_changed(limitador.status.as_ref(), &computed));
        assert_eq!(computed.observed_generation, Some(2));
    }

    #[test]
    fn test_message_change_forces_write() {
        let limitador = sample_limitador("rl", LimitadorSpec::default());
        let a = compute_status(
            &limitador,
            None,
            &WorkloadHealth::Found(&deployment_with(Some(("False", "a")))),
        );
        let b = compute_status(
            &limitador,
            None,
            &WorkloadHealth::Found(&deployment_with(Some(("False", "b")))),
        );
        assert!(status_changed(Some(&a), &b));
        assert!(status_changed(None, &b));
    }

    #[test]
    fn test_service_descriptor_in_status() {
        let limitador = sample_limitador("rl", LimitadorSpec::default());
        let status = compute_status(&limitador, None, &WorkloadHealth::Missing("x".into()));
        let service = status.service.unwrap();
        assert_eq!(service.host, "limitador-rl.default.svc.cluster.local");
        assert_eq!(service.ports.grpc, 8081);
    }
}
