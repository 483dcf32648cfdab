//! Deployment and StatefulSet

use super::pod::storage_claim_name;
use super::{apply_metadata, apply_pod_template, headless_service_name};
use crate::binding::BindingWiring;
use crate::crds::AppsodyApplication;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

pub fn apply_deployment(deployment: &mut Deployment, app: &AppsodyApplication, wiring: &BindingWiring) {
    apply_metadata(&mut deployment.metadata, app);

    let spec = deployment.spec.get_or_insert_with(DeploymentSpec::default);
    // The autoscaler owns the replica count once configured.
    if app.spec.autoscaling.is_none() {
        spec.replicas = app.spec.replicas;
    }
    spec.selector = LabelSelector {
        match_labels: Some(app.selector_labels()),
        ..Default::default()
    };
    apply_pod_template(&mut spec.template, app, wiring);
}

pub fn apply_stateful_set(
    stateful_set: &mut StatefulSet,
    app: &AppsodyApplication,
    wiring: &BindingWiring,
) {
    apply_metadata(&mut stateful_set.metadata, app);

    let spec = stateful_set.spec.get_or_insert_with(StatefulSetSpec::default);
    if app.spec.autoscaling.is_none() {
        spec.replicas = app.spec.replicas;
    }
    spec.service_name = headless_service_name(app);
    spec.pod_management_policy = Some("Parallel".to_string());
    spec.selector = LabelSelector {
        match_labels: Some(app.selector_labels()),
        ..Default::default()
    };

    // Claim templates cannot change after the StatefulSet is created.
    if spec.volume_claim_templates.as_ref().map_or(true, Vec::is_empty) {
        spec.volume_claim_templates = storage_claim(app).map(|claim| vec![claim]);
    }
    apply_pod_template(&mut spec.template, app, wiring);
}

fn storage_claim(app: &AppsodyApplication) -> Option<PersistentVolumeClaim> {
    let storage = app.spec.storage.as_ref()?;

    if let Some(template) = &storage.volume_claim_template {
        let mut claim = template.clone();
        claim.metadata.name = Some(storage_claim_name(app));
        return Some(claim);
    }

    let size = storage.size.clone()?;
    Some(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(storage_claim_name(app)),
            labels: Some(app.selector_labels()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{AppsodyApplicationSpec, AutoScalingSpec, StorageSpec, LABEL_INSTANCE};
    use crate::resources::fixtures::application;
    use crate::resources::PVC_NAME;

    #[test]
    fn test_deployment() {
        let app = application(AppsodyApplicationSpec {
            replicas: Some(3),
            ..Default::default()
        });
        let mut deployment = Deployment::default();
        apply_deployment(&mut deployment, &app, &BindingWiring::default());

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        let selector = spec.selector.match_labels.unwrap();
        assert_eq!(selector.get(LABEL_INSTANCE).map(String::as_str), Some("frontend"));
        assert_eq!(spec.template.spec.unwrap().containers.len(), 1);
    }

    #[test]
    fn test_deployment_leaves_replicas_to_autoscaler() {
        let app = application(AppsodyApplicationSpec {
            replicas: Some(3),
            autoscaling: Some(AutoScalingSpec {
                max_replicas: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_deployment(&mut deployment, &app, &BindingWiring::default());
        assert_eq!(deployment.spec.unwrap().replicas, Some(4));
    }

    #[test]
    fn test_stateful_set_with_size() {
        let app = application(AppsodyApplicationSpec {
            storage: Some(StorageSpec {
                size: Some("2Gi".to_string()),
                mount_path: Some("/var/lib/data".to_string()),
                volume_claim_template: None,
            }),
            ..Default::default()
        });
        let mut stateful_set = StatefulSet::default();
        apply_stateful_set(&mut stateful_set, &app, &BindingWiring::default());

        let spec = stateful_set.spec.unwrap();
        assert_eq!(spec.service_name, "frontend-headless");
        assert_eq!(spec.pod_management_policy.as_deref(), Some("Parallel"));
        let claims = spec.volume_claim_templates.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some(PVC_NAME));
        let requests = claims[0]
            .spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.clone())
            .unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("2Gi".to_string())));
    }

    #[test]
    fn test_stateful_set_keeps_existing_claims() {
        let app = application(AppsodyApplicationSpec {
            storage: Some(StorageSpec {
                size: Some("5Gi".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let existing = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(PVC_NAME.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut stateful_set = StatefulSet {
            spec: Some(StatefulSetSpec {
                volume_claim_templates: Some(vec![existing.clone()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_stateful_set(&mut stateful_set, &app, &BindingWiring::default());
        assert_eq!(stateful_set.spec.unwrap().volume_claim_templates, Some(vec![existing]));
    }

    #[test]
    fn test_stateful_set_uses_claim_template_name() {
        let app = application(AppsodyApplicationSpec {
            storage: Some(StorageSpec {
                mount_path: Some("/data".to_string()),
                volume_claim_template: Some(PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some("data".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut stateful_set = StatefulSet::default();
        apply_stateful_set(&mut stateful_set, &app, &BindingWiring::default());

        let spec = stateful_set.spec.unwrap();
        assert_eq!(spec.volume_claim_templates.unwrap()[0].metadata.name.as_deref(), Some("data"));
        let mounts = spec.template.spec.unwrap().containers[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].name, "data");
    }
}
