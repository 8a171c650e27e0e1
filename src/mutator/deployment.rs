//! Deployment mutators

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, PodSpec};

use super::quantity::requirements_equal;
use super::{sync, Mutator};

/// Ordered mutators for the Limitador Deployment
///
/// Container shape runs first so the per-container mutators after it can
/// assume the existing pod has the container they address.
pub const DEPLOYMENT_MUTATORS: &[Mutator<Deployment>] = &[
    container_shape,
    replicas,
    pod_labels,
    image,
    command,
    ports,
    probes,
    resources,
    affinity,
    strategy,
    volumes,
    volume_mounts,
    env,
];

fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

fn pod_spec_mut(deployment: &mut Deployment) -> &mut PodSpec {
    deployment
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
}

fn container(deployment: &Deployment) -> Option<&Container> {
    pod_spec(deployment)?.containers.first()
}

/// Apply `f` to the desired and existing main containers when both exist
fn with_containers(
    desired: &Deployment,
    existing: &mut Deployment,
    f: impl FnOnce(&Container, &mut Container) -> bool,
) -> bool {
    let Some(want) = container(desired) else {
        return false;
    };
    match pod_spec_mut(existing).containers.first_mut() {
        Some(have) => f(want, have),
        None => false,
    }
}

fn container_shape(desired: &Deployment, existing: &mut Deployment) -> bool {
    let want = pod_spec(desired).map(|p| &p.containers);
    let Some(want) = want else {
        return false;
    };
    let have = &mut pod_spec_mut(existing).containers;
    let same_shape = want.len() == have.len()
        && want.iter().zip(have.iter()).all(|(w, h)| w.name == h.name);
    if same_shape {
        return false;
    }
    *have = want.clone();
    true
}

fn replicas(desired: &Deployment, existing: &mut Deployment) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.replicas);
    sync(
        &want,
        &mut existing.spec.get_or_insert_with(Default::default).replicas,
    )
}

/// Ensure the selector labels are on the pod template, keeping extra labels
fn pod_labels(desired: &Deployment, existing: &mut Deployment) -> bool {
    let Some(want) = desired
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
    else {
        return false;
    };

    let have = existing
        .spec
        .get_or_insert_with(Default::default)
        .template
        .metadata
        .get_or_insert_with(Default::default)
        .labels
        .get_or_insert_with(Default::default);

    let mut changed = false;
    for (key, value) in want {
        if have.get(key) != Some(value) {
            have.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

fn image(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        sync(&want.image, &mut have.image)
    })
}

fn command(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        sync(&want.command, &mut have.command)
    })
}

fn ports(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        sync(&want.ports, &mut have.ports)
    })
}

fn probes(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        let liveness = sync(&want.liveness_probe, &mut have.liveness_probe);
        let readiness = sync(&want.readiness_probe, &mut have.readiness_probe);
        liveness || readiness
    })
}

fn resources(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        if requirements_equal(want.resources.as_ref(), have.resources.as_ref()) {
            return false;
        }
        sync(&want.resources, &mut have.resources)
    })
}

fn affinity(desired: &Deployment, existing: &mut Deployment) -> bool {
    let want = pod_spec(desired).and_then(|p| p.affinity.clone());
    sync(&want, &mut pod_spec_mut(existing).affinity)
}

fn strategy(desired: &Deployment, existing: &mut Deployment) -> bool {
    let want = desired.spec.as_ref().and_then(|s| s.strategy.clone());
    sync(
        &want,
        &mut existing.spec.get_or_insert_with(Default::default).strategy,
    )
}

fn volumes(desired: &Deployment, existing: &mut Deployment) -> bool {
    let want = pod_spec(desired).and_then(|p| p.volumes.clone());
    sync(&want, &mut pod_spec_mut(existing).volumes)
}

fn volume_mounts(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| {
        sync(&want.volume_mounts, &mut have.volume_mounts)
    })
}

fn env(desired: &Deployment, existing: &mut Deployment) -> bool {
    with_containers(desired, existing, |want, have| sync(&want.env, &mut have.env))
}
