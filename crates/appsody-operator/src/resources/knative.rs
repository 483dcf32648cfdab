//! Knative Service replacing the Deployment, Service, Route and HPA set

use super::{apply_metadata, apply_pod_template};
use crate::binding::BindingWiring;
use crate::crds::knative::{RevisionTemplateSpec, Service, LABEL_VISIBILITY};
use crate::crds::AppsodyApplication;
use k8s_openapi::api::core::v1::{ContainerPort, PodTemplateSpec, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const CLUSTER_LOCAL: &str = "cluster-local";

pub fn apply_knative_service(service: &mut Service, app: &AppsodyApplication, wiring: &BindingWiring) {
    apply_metadata(&mut service.metadata, app);

    let labels = service.metadata.labels.get_or_insert_with(BTreeMap::new);
    if app.is_exposed() {
        labels.remove(LABEL_VISIBILITY);
    } else {
        labels.insert(LABEL_VISIBILITY.to_string(), CLUSTER_LOCAL.to_string());
    }

    let revision = service.spec.template.get_or_insert_with(RevisionTemplateSpec::default);
    let mut revision_spec = revision.spec.take().unwrap_or_default();
    let mut template = PodTemplateSpec {
        metadata: revision.metadata.take(),
        spec: Some(std::mem::take(&mut revision_spec.pod)),
    };
    apply_pod_template(&mut template, app, wiring);

    if let Some(spec) = template.spec.as_mut() {
        // Knative schedules revisions itself and rejects node affinity.
        spec.affinity = None;
        for container in spec.containers.iter_mut() {
            container.ports = container.ports.take().map(|ports| {
                ports
                    .into_iter()
                    .map(|p| ContainerPort {
                        container_port: p.container_port,
                        ..Default::default()
                    })
                    .collect()
            });
            strip_probe_port(container.readiness_probe.as_mut());
            strip_probe_port(container.liveness_probe.as_mut());
        }
    }

    revision.metadata = template.metadata;
    revision_spec.pod = template.spec.unwrap_or_default();
    revision.spec = Some(revision_spec);
}

/// Knative routes probes to the serving port and refuses explicit ones
fn strip_probe_port(probe: Option<&mut Probe>) {
    let Some(probe) = probe else { return };
    if let Some(http) = probe.http_get.as_mut() {
        http.port = IntOrString::Int(0);
    }
    if let Some(tcp) = probe.tcp_socket.as_mut() {
        tcp.port = IntOrString::Int(0);
    }
}
