//! Service mutators

use k8s_openapi::api::core::v1::Service;

use super::{sync, Mutator};

/// Ordered mutators for the Limitador Service
pub const SERVICE_MUTATORS: &[Mutator<Service>] = &[ports, selector];

fn ports(desired: &Service, existing: &mut Service) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.ports.clone());
    sync(
        &want,
        &mut existing.spec.get_or_insert_with(Default::default).ports,
    )
}

fn selector(desired: &Service, existing: &mut Service) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.selector.clone());
    sync(
        &want,
        &mut existing.spec.get_or_insert_with(Default::default).selector,
    )
}
