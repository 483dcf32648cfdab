use super::apply_metadata;
use crate::crds::AppsodyApplication;
use crate::defaults::DEFAULT_MIN_REPLICAS;
use k8s_openapi::api::autoscaling::v1::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use kube::ResourceExt;

/// HorizontalPodAutoscaler scaling the application's workload. Does nothing
/// when autoscaling is not configured.
pub fn apply_autoscaler(autoscaler: &mut HorizontalPodAutoscaler, app: &AppsodyApplication) {
    let Some(autoscaling) = app.spec.autoscaling.as_ref() else {
        return;
    };
    apply_metadata(&mut autoscaler.metadata, app);

    let kind = if app.uses_storage() { "StatefulSet" } else { "Deployment" };
    let spec = autoscaler
        .spec
        .get_or_insert_with(HorizontalPodAutoscalerSpec::default);
    spec.scale_target_ref = CrossVersionObjectReference {
        api_version: Some("apps/v1".to_string()),
        kind: kind.to_string(),
        name: app.name_any(),
    };
    let min_replicas = autoscaling.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS);
    spec.min_replicas = Some(min_replicas);
    spec.max_replicas = autoscaling.max_replicas.unwrap_or(min_replicas);
    spec.target_cpu_utilization_percentage = autoscaling.target_cpu_utilization_percentage;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{AppsodyApplicationSpec, AutoScalingSpec, StorageSpec};
    use crate::resources::fixtures::application;

    #[test]
    fn test_autoscaler_targets_workload() {
        let mut app = application(AppsodyApplicationSpec {
            autoscaling: Some(AutoScalingSpec {
                min_replicas: Some(2),
                max_replicas: Some(6),
                target_cpu_utilization_percentage: Some(75),
            }),
            ..Default::default()
        });

        let mut autoscaler = HorizontalPodAutoscaler::default();
        apply_autoscaler(&mut autoscaler, &app);
        let spec = autoscaler.spec.unwrap();
        assert_eq!(spec.scale_target_ref.kind, "Deployment");
        assert_eq!(spec.scale_target_ref.name, "frontend");
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 6);
        assert_eq!(spec.target_cpu_utilization_percentage, Some(75));

        app.spec.storage = Some(StorageSpec {
            size: Some("1Gi".to_string()),
            ..Default::default()
        });
        let mut autoscaler = HorizontalPodAutoscaler::default();
        apply_autoscaler(&mut autoscaler, &app);
        assert_eq!(autoscaler.spec.unwrap().scale_target_ref.kind, "StatefulSet");
    }

    #[test]
    fn test_no_autoscaling_leaves_object_untouched() {
        let app = application(AppsodyApplicationSpec::default());
        let mut autoscaler = HorizontalPodAutoscaler::default();
        apply_autoscaler(&mut autoscaler, &app);
        assert_eq!(autoscaler, HorizontalPodAutoscaler::default());
    }
}
