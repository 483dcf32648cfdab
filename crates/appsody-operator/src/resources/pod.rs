//! Pod template shared by Deployments, StatefulSets and Knative services

use super::{apply_metadata, non_empty, APP_CONTAINER, PVC_NAME};
use crate::binding::BindingWiring;
use crate::crds::AppsodyApplication;
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, LocalObjectReference, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PodTemplateSpec,
    PreferredSchedulingTerm, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Node label carrying the CPU architecture
pub const ARCH_LABEL: &str = "kubernetes.io/arch";

/// Default name of the application container port
pub const DEFAULT_CONTAINER_PORT_NAME: &str = "http";

pub fn apply_pod_template(
    template: &mut PodTemplateSpec,
    app: &AppsodyApplication,
    wiring: &BindingWiring,
) {
    apply_metadata(template.metadata.get_or_insert_with(ObjectMeta::default), app);

    let spec = template.spec.get_or_insert_with(PodSpec::default);
    let mut container = spec
        .containers
        .iter()
        .find(|c| c.name == APP_CONTAINER)
        .cloned()
        .unwrap_or_default();
    apply_app_container(&mut container, app, wiring);

    let mut containers = vec![container];
    containers.extend(app.spec.sidecar_containers.iter().flatten().cloned());
    spec.containers = containers;
    spec.init_containers = app.spec.init_containers.clone().and_then(non_empty);

    let volumes = app
        .spec
        .volumes
        .iter()
        .flatten()
        .chain(wiring.volumes.iter())
        .cloned()
        .collect();
    spec.volumes = non_empty(volumes);

    spec.service_account_name = Some(app.service_account());
    spec.image_pull_secrets = app.spec.pull_secret.as_ref().map(|secret| {
        vec![LocalObjectReference {
            name: Some(secret.clone()),
        }]
    });
    spec.affinity = architecture_affinity(app.spec.architecture.as_deref().unwrap_or_default());
}

fn apply_app_container(container: &mut Container, app: &AppsodyApplication, wiring: &BindingWiring) {
    container.name = APP_CONTAINER.to_string();
    container.image = Some(app.image());
    container.image_pull_policy = app.spec.pull_policy.map(|p| p.as_str().to_string());

    let port_name = app
        .spec
        .service
        .as_ref()
        .and_then(|s| s.port_name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTAINER_PORT_NAME.to_string());
    container.ports = Some(vec![ContainerPort {
        container_port: app.container_port(),
        name: Some(port_name),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }]);

    container.readiness_probe = app.spec.readiness_probe.clone();
    container.liveness_probe = app.spec.liveness_probe.clone();
    container.resources = app.spec.resource_constraints.clone();

    let env = app
        .spec
        .env
        .iter()
        .flatten()
        .chain(wiring.env.iter())
        .cloned()
        .collect();
    container.env = non_empty(env);
    container.env_from = app.spec.env_from.clone().and_then(non_empty);

    let mut mounts: Vec<VolumeMount> = app
        .spec
        .volume_mounts
        .iter()
        .flatten()
        .chain(wiring.volume_mounts.iter())
        .cloned()
        .collect();
    if let Some(mount_path) = app.spec.storage.as_ref().and_then(|s| s.mount_path.as_ref()) {
        let name = storage_claim_name(app);
        if !mounts.iter().any(|m| &m.mount_path == mount_path) {
            mounts.push(VolumeMount {
                name,
                mount_path: mount_path.clone(),
                ..Default::default()
            });
        }
    }
    container.volume_mounts = non_empty(mounts);
}

/// Name of the claim template providing the application's storage
pub fn storage_claim_name(app: &AppsodyApplication) -> String {
    app.spec
        .storage
        .as_ref()
        .and_then(|s| s.volume_claim_template.as_ref())
        .and_then(|t| t.metadata.name.clone())
        .unwrap_or_else(|| PVC_NAME.to_string())
}

/// Require one of the listed architectures, preferring them in list order
pub fn architecture_affinity(architectures: &[String]) -> Option<Affinity> {
    if architectures.is_empty() {
        return None;
    }

    let term = |values: Vec<String>| NodeSelectorTerm {
        match_expressions: Some(vec![NodeSelectorRequirement {
            key: ARCH_LABEL.to_string(),
            operator: "In".to_string(),
            values: Some(values),
        }]),
        ..Default::default()
    };

    let count = architectures.len() as i32;
    let preferred = architectures
        .iter()
        .enumerate()
        .map(|(i, arch)| PreferredSchedulingTerm {
            weight: count - i as i32,
            preference: term(vec![arch.clone()]),
        })
        .collect();

    Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![term(architectures.to_vec())],
            }),
            preferred_during_scheduling_ignored_during_execution: Some(preferred),
        }),
        ..Default::default()
    })
}
