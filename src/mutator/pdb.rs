//! PodDisruptionBudget mutators

use k8s_openapi::api::policy::v1::PodDisruptionBudget;

use super::{sync, Mutator};

/// Ordered mutators for the disruption budget
pub const PDB_MUTATORS: &[Mutator<PodDisruptionBudget>] =
    &[max_unavailable, min_available, selector];

fn max_unavailable(desired: &PodDisruptionBudget, existing: &mut PodDisruptionBudget) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.max_unavailable.clone());
    sync(
        &want,
        &mut existing
            .spec
            .get_or_insert_with(Default::default)
            .max_unavailable,
    )
}

fn min_available(desired: &PodDisruptionBudget, existing: &mut PodDisruptionBudget) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.min_available.clone());
    sync(
        &want,
        &mut existing
            .spec
            .get_or_insert_with(Default::default)
            .min_available,
    )
}

fn selector(desired: &PodDisruptionBudget, existing: &mut PodDisruptionBudget) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.selector.clone());
    sync(
        &want,
        &mut existing.spec.get_or_insert_with(Default::default).selector,
    )
}
