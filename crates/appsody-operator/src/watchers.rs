//! # Secondary watchers
//!
//! Map events on Pods, Secrets and ImageStreams to the applications that
//! must be reconciled again. All mappers are pure over a snapshot of the
//! controller's application cache.

use crate::binding::binding_secret_name;
use crate::crds::image::{ImageStream, ImageStreamRef};
use crate::crds::{AppsodyApplication, LABEL_INSTANCE, LABEL_MANAGED_BY, OPERATOR_NAME};
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use std::sync::Arc;

/// Label selector restricting the Pod watch to operator-managed pods
pub fn managed_pod_selector() -> String {
    format!("{}={}", LABEL_MANAGED_BY, OPERATOR_NAME)
}

fn object_ref(app: &AppsodyApplication) -> ObjectRef<AppsodyApplication> {
    let reference = ObjectRef::new(&app.name_any());
    match app.namespace() {
        Some(namespace) => reference.within(&namespace),
        None => reference,
    }
}

/// The application named by a managed pod's instance label
pub fn apps_for_pod(pod: &Pod) -> Option<ObjectRef<AppsodyApplication>> {
    let labels = pod.metadata.labels.as_ref()?;
    if labels.get(LABEL_MANAGED_BY).map(String::as_str) != Some(OPERATOR_NAME) {
        return None;
    }
    let instance = labels.get(LABEL_INSTANCE)?;
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(instance).within(&namespace))
}

/// Applications consuming the Secret as a binding, publishing credentials
/// from it, or using it as their route certificate
pub fn apps_for_secret(
    secret: &Secret,
    apps: &[Arc<AppsodyApplication>],
) -> Vec<ObjectRef<AppsodyApplication>> {
    let (Some(name), Some(namespace)) = (secret.metadata.name.as_deref(), secret.namespace()) else {
        return Vec::new();
    };

    apps.iter()
        .filter(|app| {
            consumes_secret(app, &namespace, name)
                || references_secret(app, &namespace, name)
        })
        .map(|app| object_ref(app))
        .collect()
}

fn consumes_secret(app: &AppsodyApplication, namespace: &str, name: &str) -> bool {
    let own_namespace = app.namespace().unwrap_or_default();
    app.spec
        .service
        .iter()
        .flat_map(|s| s.consumes.iter().flatten())
        .any(|entry| {
            let provider_namespace = entry
                .namespace
                .as_deref()
                .filter(|ns| !ns.is_empty())
                .unwrap_or(&own_namespace);
            provider_namespace == namespace
                && binding_secret_name(provider_namespace, &entry.name) == name
        })
}

fn references_secret(app: &AppsodyApplication, namespace: &str, name: &str) -> bool {
    if app.namespace().as_deref() != Some(namespace) {
        return false;
    }

    let auth = app
        .spec
        .service
        .as_ref()
        .and_then(|s| s.provides.as_ref())
        .and_then(|p| p.auth.as_ref());
    let auth_match = auth.map_or(false, |auth| {
        [auth.username.as_ref(), auth.password.as_ref()]
            .into_iter()
            .flatten()
            .any(|selector| selector.name.as_deref() == Some(name))
    });

    let certificate_match = app
        .spec
        .route
        .as_ref()
        .and_then(|r| r.certificate_secret_ref.as_deref())
        == Some(name);

    auth_match || certificate_match
}

/// Applications whose image is a reference to the ImageStream
pub fn apps_for_image_stream(
    stream: &ImageStream,
    apps: &[Arc<AppsodyApplication>],
) -> Vec<ObjectRef<AppsodyApplication>> {
    let (Some(name), Some(namespace)) = (stream.metadata.name.as_deref(), stream.namespace()) else {
        return Vec::new();
    };

    apps.iter()
        .filter(|app| {
            let own_namespace = app.namespace().unwrap_or_default();
            ImageStreamRef::parse(&app.spec.application_image, &own_namespace)
                .map_or(false, |r| r.name == name && r.namespace == namespace)
        })
        .map(|app| object_ref(app))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{
        AppsodyApplicationSpec, RouteSpec, ServiceBindingAuth, ServiceBindingConsumes,
        ServiceBindingProvides, ServiceSpec,
    };
    use k8s_openapi::api::core::v1::SecretKeySelector;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn app(name: &str, namespace: &str, spec: AppsodyApplicationSpec) -> Arc<AppsodyApplication> {
        Arc::new(AppsodyApplication {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        })
    }

    fn meta(name: &str, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    fn consuming(name: &str, namespace: Option<&str>) -> AppsodyApplicationSpec {
        AppsodyApplicationSpec {
            service: Some(ServiceSpec {
                consumes: Some(vec![ServiceBindingConsumes {
                    name: name.to_string(),
                    namespace: namespace.map(str::to_string),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_mapping() {
        let mut pod = Pod {
            metadata: meta("frontend-7d9f-abcde", "shop"),
            ..Default::default()
        };
        assert_eq!(apps_for_pod(&pod), None);

        pod.metadata.labels = Some(BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
            (LABEL_INSTANCE.to_string(), "frontend".to_string()),
        ]));
        assert_eq!(
            apps_for_pod(&pod),
            Some(ObjectRef::new("frontend").within("shop"))
        );
        assert_eq!(managed_pod_selector(), "app.kubernetes.io/managed-by=appsody-operator");
    }

    #[test]
    fn test_secret_mapping() {
        let apps = vec![
            app("frontend", "shop", consuming("orders", None)),
            app("reports", "finance", consuming("orders", Some("shop"))),
            app("audit", "finance", consuming("orders", None)),
            app(
                "orders",
                "shop",
                AppsodyApplicationSpec {
                    service: Some(ServiceSpec {
                        provides: Some(ServiceBindingProvides {
                            auth: Some(ServiceBindingAuth {
                                username: Some(SecretKeySelector {
                                    name: Some("orders-auth".to_string()),
                                    key: "user".to_string(),
                                    optional: None,
                                }),
                                password: None,
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
            app(
                "storefront",
                "shop",
                AppsodyApplicationSpec {
                    route: Some(RouteSpec {
                        certificate_secret_ref: Some("storefront-tls".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
        ];

        let binding = Secret {
            metadata: meta("shop-orders", "shop"),
            ..Default::default()
        };
        assert_eq!(
            apps_for_secret(&binding, &apps),
            vec![
                ObjectRef::new("frontend").within("shop"),
                ObjectRef::new("reports").within("finance"),
            ]
        );

        let auth = Secret {
            metadata: meta("orders-auth", "shop"),
            ..Default::default()
        };
        assert_eq!(apps_for_secret(&auth, &apps), vec![ObjectRef::new("orders").within("shop")]);

        let tls = Secret {
            metadata: meta("storefront-tls", "shop"),
            ..Default::default()
        };
        assert_eq!(apps_for_secret(&tls, &apps), vec![ObjectRef::new("storefront").within("shop")]);

        let elsewhere = Secret {
            metadata: meta("storefront-tls", "finance"),
            ..Default::default()
        };
        assert!(apps_for_secret(&elsewhere, &apps).is_empty());
    }

    #[test]
    fn test_image_stream_mapping() {
        let image = |image: &str| AppsodyApplicationSpec {
            application_image: image.to_string(),
            ..Default::default()
        };
        let apps = vec![
            app("frontend", "shop", image("frontend:v2")),
            app("preview", "staging", image("shop/frontend")),
            app("external", "shop", image("quay.io/shop/frontend:1.0")),
            app("other", "shop", image("orders")),
        ];
        let stream = ImageStream {
            metadata: meta("frontend", "shop"),
            ..Default::default()
        };

        assert_eq!(
            apps_for_image_stream(&stream, &apps),
            vec![
                ObjectRef::new("frontend").within("shop"),
                ObjectRef::new("preview").within("staging"),
            ]
        );
    }
}
