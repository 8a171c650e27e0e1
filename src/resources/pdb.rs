//! Limitador PodDisruptionBudget

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use super::{selector_labels, tag_for_deletion};
use crate::crd::Limitador;

/// Build the disruption budget, tagged for deletion when the spec has none
pub fn build_pdb(limitador: &Limitador, mut metadata: ObjectMeta) -> PodDisruptionBudget {
    let Some(pdb) = &limitador.spec.pdb else {
        tag_for_deletion(&mut metadata);
        return PodDisruptionBudget {
            metadata,
            ..Default::default()
        };
    };

    PodDisruptionBudget {
        metadata,
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: pdb.max_unavailable.clone(),
            min_available: pdb.min_available.clone(),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(&limitador.name_any())),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
