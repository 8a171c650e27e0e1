//! Limitador Deployment

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec,
    Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{
    config_map_name, selector_labels, CONFIG_FILE_PATH, CONFIG_MOUNT_PATH, CONFIG_VOLUME_NAME,
    CONTAINER_NAME,
};
use crate::config::OperatorConfig;
use crate::crd::{Limitador, LimitadorSpec};
use crate::storage::StorageStrategy;

const BINARY: &str = "limitador-server";
const STATUS_PATH: &str = "/status";
const CONFIG_MAP_DEFAULT_MODE: i32 = 0o644;

/// Full container command: binary, header mode, limits file, storage args
pub fn build_command(spec: &LimitadorSpec, storage: &StorageStrategy) -> Vec<String> {
    let mut command = vec![BINARY.to_string()];
    if let Some(mode) = spec.rate_limit_headers {
        command.push("--rate-limit-headers".to_string());
        command.push(mode.to_string());
    }
    command.push(CONFIG_FILE_PATH.to_string());
    command.extend(storage.args.iter().cloned());
    command
}

fn status_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(STATUS_PATH.to_string()),
            port: IntOrString::String("http".to_string()),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(5),
        timeout_seconds: Some(2),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Build the Limitador Deployment
pub fn build_deployment(
    limitador: &Limitador,
    storage: &StorageStrategy,
    config: &OperatorConfig,
    metadata: ObjectMeta,
) -> Deployment {
    let name = limitador.name_any();
    let spec = &limitador.spec;
    let listener = spec.listener();
    let labels = selector_labels(&name);

    let mut volume_mounts = vec![VolumeMount {
        name: CONFIG_VOLUME_NAME.to_string(),
        mount_path: CONFIG_MOUNT_PATH.to_string(),
        ..Default::default()
    }];
    volume_mounts.extend(storage.volume_mounts.iter().cloned());

    let mut volumes = vec![Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&name),
            default_mode: Some(CONFIG_MAP_DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }];
    volumes.extend(storage.volumes.iter().cloned());

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.image(spec.version())),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(build_command(spec, storage)),
        ports: Some(vec![
            container_port("http", listener.http_port()),
            container_port("grpc", listener.grpc_port()),
        ]),
        env: (!storage.env.is_empty()).then(|| storage.env.clone()),
        liveness_probe: Some(status_probe()),
        readiness_probe: Some(status_probe()),
        resources: Some(
            spec.resource_requirements
                .clone()
                .unwrap_or_else(|| config.default_resources.clone()),
        ),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(storage.rollout.clone()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    affinity: spec.affinity.clone(),
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
