//! # Object generators
//!
//! Each generator writes the desired state of one child object into an
//! object that was either fetched from the cluster or freshly defaulted.
//! Generators never talk to the API server; the controller hands them to
//! [`create_or_update`](crate::reconciler::create_or_update).

pub mod autoscaling;
pub mod knative;
pub mod monitoring;
pub mod pod;
pub mod route;
pub mod service;
pub mod service_account;
pub mod workload;

pub use autoscaling::apply_autoscaler;
pub use knative::apply_knative_service;
pub use monitoring::apply_service_monitor;
pub use pod::{apply_pod_template, architecture_affinity};
pub use route::{apply_route, route_host, RouteCertificates};
pub use service::{apply_headless_service, apply_service};
pub use service_account::apply_service_account;
pub use workload::{apply_deployment, apply_stateful_set};

use crate::crds::AppsodyApplication;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Name of the application container in every generated pod
pub const APP_CONTAINER: &str = "app";

/// Name of the generated persistent volume claim template
pub const PVC_NAME: &str = "pvc";

/// Headless service backing a StatefulSet
pub fn headless_service_name(app: &AppsodyApplication) -> String {
    format!("{}-headless", app.name_any())
}

/// Merge the application labels and annotations into `meta`
pub fn apply_metadata(meta: &mut ObjectMeta, app: &AppsodyApplication) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .extend(app.labels());

    let annotations = app.annotations();
    if !annotations.is_empty() {
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::crds::{AppsodyApplication, AppsodyApplicationSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub fn application(spec: AppsodyApplicationSpec) -> AppsodyApplication {
        AppsodyApplication {
            metadata: ObjectMeta {
                name: Some("frontend".to_string()),
                namespace: Some("shop".to_string()),
                uid: Some("0b7c3f6e".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: AppsodyApplicationSpec {
                application_image: "quay.io/shop/frontend:1.0".to_string(),
                stack: "nodejs-express".to_string(),
                ..spec
            },
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{AppsodyApplicationSpec, LABEL_INSTANCE, LABEL_MANAGED_BY};

    #[test]
    fn test_apply_metadata_keeps_foreign_labels() {
        let mut app = fixtures::application(AppsodyApplicationSpec::default());
        app.metadata.annotations = Some(BTreeMap::from([(
            "owner".to_string(),
            "web-team".to_string(),
        )]));
        let mut meta = ObjectMeta {
            labels: Some(BTreeMap::from([(
                "pod-template-hash".to_string(),
                "abc".to_string(),
            )])),
            ..Default::default()
        };

        apply_metadata(&mut meta, &app);

        let labels = meta.labels.unwrap();
        assert_eq!(labels.get("pod-template-hash").map(String::as_str), Some("abc"));
        assert_eq!(labels.get(LABEL_INSTANCE).map(String::as_str), Some("frontend"));
        assert!(labels.contains_key(LABEL_MANAGED_BY));
        assert_eq!(meta.annotations.unwrap().len(), 1);
        assert_eq!(headless_service_name(&app), "frontend-headless");
    }
}
