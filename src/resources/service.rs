//! Limitador Service

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::selector_labels;
use crate::crd::Limitador;

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::String(name.to_string())),
        ..Default::default()
    }
}

/// Build the Service exposing both listeners
pub fn build_service(limitador: &Limitador, metadata: ObjectMeta) -> Service {
    let listener = limitador.spec.listener();

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&limitador.name_any())),
            ports: Some(vec![
                service_port("http", listener.http_port()),
                service_port("grpc", listener.grpc_port()),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
