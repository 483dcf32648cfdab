//! Service and headless Service

use super::apply_metadata;
use crate::crds::{AppsodyApplication, ServiceType, LABEL_MONITOR_ENABLED};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

pub fn apply_service(service: &mut Service, app: &AppsodyApplication) {
    apply_metadata(&mut service.metadata, app);

    let labels = service.metadata.labels.get_or_insert_with(BTreeMap::new);
    if app.spec.monitoring.is_some() {
        labels.insert(LABEL_MONITOR_ENABLED.to_string(), "true".to_string());
    } else {
        labels.remove(LABEL_MONITOR_ENABLED);
    }

    let settings = app.spec.service.clone().unwrap_or_default();
    if let Some(annotations) = settings.annotations.filter(|a| !a.is_empty()) {
        service
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
    }

    let service_type = settings.type_.unwrap_or_default();
    let spec = service.spec.get_or_insert_with(ServiceSpec::default);
    spec.type_ = Some(service_type.as_str().to_string());
    spec.selector = Some(app.selector_labels());

    // Start from the stored port so an allocated node port survives.
    let mut port = first_port(spec);
    set_port(&mut port, app);
    port.node_port = if service_type.allows_node_port() {
        settings.node_port.or(port.node_port)
    } else {
        None
    };
    spec.ports = Some(vec![port]);
}

pub fn apply_headless_service(service: &mut Service, app: &AppsodyApplication) {
    apply_metadata(&mut service.metadata, app);

    let spec = service.spec.get_or_insert_with(ServiceSpec::default);
    spec.type_ = Some(ServiceType::ClusterIP.as_str().to_string());
    spec.cluster_ip = Some("None".to_string());
    spec.selector = Some(app.selector_labels());

    let mut port = first_port(spec);
    set_port(&mut port, app);
    port.node_port = None;
    spec.ports = Some(vec![port]);
}

fn first_port(spec: &ServiceSpec) -> ServicePort {
    spec.ports
        .as_ref()
        .and_then(|ports| ports.first())
        .cloned()
        .unwrap_or_default()
}

fn set_port(port: &mut ServicePort, app: &AppsodyApplication) {
    port.name = Some(app.service_port_name());
    port.port = app.service_port();
    port.target_port = Some(IntOrString::Int(app.container_port()));
    port.protocol = Some("TCP".to_string());
}
