//! OpenShift Route exposing the application Service

use super::apply_metadata;
use crate::crds::route::{Route, RoutePort, RouteTargetReference, TlsConfig};
use crate::crds::AppsodyApplication;
use crate::defaults::OperatorSettings;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_KEY_KEY: &str = "tls.key";
const CA_CERT_KEY: &str = "ca.crt";
const DEST_CA_CERT_KEY: &str = "destCA.crt";

/// TLS material read from the route's certificate secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteCertificates {
    pub certificate: Option<String>,
    pub key: Option<String>,
    pub ca_certificate: Option<String>,
    pub destination_ca_certificate: Option<String>,
}

impl RouteCertificates {
    pub fn from_secret(secret: &Secret) -> Self {
        let read = |key: &str| {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
                .or_else(|| secret.string_data.as_ref().and_then(|data| data.get(key).cloned()))
        };
        Self {
            certificate: read(TLS_CERT_KEY),
            key: read(TLS_KEY_KEY),
            ca_certificate: read(CA_CERT_KEY),
            destination_ca_certificate: read(DEST_CA_CERT_KEY),
        }
    }
}

/// Host requested by the application, or one derived from the cluster's
/// default host name
pub fn route_host(app: &AppsodyApplication, settings: &OperatorSettings) -> Option<String> {
    let requested = app
        .spec
        .route
        .as_ref()
        .and_then(|r| r.host.clone())
        .filter(|h| !h.is_empty());
    requested.or_else(|| {
        settings.default_host_name.as_ref().map(|domain| {
            format!(
                "{}-{}.{}",
                app.name_any(),
                app.namespace().unwrap_or_default(),
                domain
            )
        })
    })
}

pub fn apply_route(
    route: &mut Route,
    app: &AppsodyApplication,
    settings: &OperatorSettings,
    certificates: Option<&RouteCertificates>,
) {
    apply_metadata(&mut route.metadata, app);

    let config = app.spec.route.clone().unwrap_or_default();
    if let Some(annotations) = config.annotations.filter(|a| !a.is_empty()) {
        route
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
    }

    // An empty host lets the router assign one; keep what it assigned.
    if let Some(host) = route_host(app, settings) {
        route.spec.host = Some(host);
    }
    route.spec.path = config.path.filter(|p| !p.is_empty());
    route.spec.to = RouteTargetReference {
        kind: "Service".to_string(),
        name: app.name_any(),
        weight: Some(100),
    };
    route.spec.port = Some(RoutePort {
        target_port: IntOrString::String(app.service_port_name()),
    });

    route.spec.tls = config.termination.map(|termination| {
        let certificates = certificates.cloned().unwrap_or_default();
        TlsConfig {
            termination,
            insecure_edge_termination_policy: config.insecure_edge_termination_policy,
            certificate: certificates.certificate,
            key: certificates.key,
            ca_certificate: certificates.ca_certificate,
            destination_ca_certificate: certificates.destination_ca_certificate,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::route::{InsecureEdgeTerminationPolicy, TlsTermination};
    use crate::crds::{AppsodyApplicationSpec, RouteSpec};
    use crate::resources::fixtures::application;
    use k8s_openapi::ByteString;

    fn settings(host: Option<&str>) -> OperatorSettings {
        OperatorSettings {
            default_host_name: host.map(str::to_string),
        }
    }

    #[test]
    fn test_route_host() {
        let app = application(AppsodyApplicationSpec::default());
        assert_eq!(route_host(&app, &settings(None)), None);
        assert_eq!(
            route_host(&app, &settings(Some("apps.example.com"))).as_deref(),
            Some("frontend-shop.apps.example.com")
        );

        let app = application(AppsodyApplicationSpec {
            route: Some(RouteSpec {
                host: Some("shop.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(
            route_host(&app, &settings(Some("apps.example.com"))).as_deref(),
            Some("shop.example.com")
        );
    }

    #[test]
    fn test_plain_route() {
        let app = application(AppsodyApplicationSpec {
            expose: Some(true),
            ..Default::default()
        });
        let mut route = Route::default();
        apply_route(&mut route, &app, &settings(None), None);

        assert_eq!(route.spec.to.name, "frontend");
        assert_eq!(route.spec.to.kind, "Service");
        assert_eq!(
            route.spec.port.unwrap().target_port,
            IntOrString::String("8080-tcp".to_string())
        );
        assert!(route.spec.tls.is_none());
        assert!(route.spec.host.is_none());
    }

    #[test]
    fn test_reencrypt_route_with_certificates() {
        let app = application(AppsodyApplicationSpec {
            route: Some(RouteSpec {
                termination: Some(TlsTermination::Reencrypt),
                insecure_edge_termination_policy: Some(InsecureEdgeTerminationPolicy::Redirect),
                certificate_secret_ref: Some("frontend-tls".to_string()),
                path: Some("/api".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let secret = Secret {
            data: Some(BTreeMap::from([
                (TLS_CERT_KEY.to_string(), ByteString(b"CERT".to_vec())),
                (TLS_KEY_KEY.to_string(), ByteString(b"KEY".to_vec())),
                (DEST_CA_CERT_KEY.to_string(), ByteString(b"DEST".to_vec())),
            ])),
            ..Default::default()
        };
        let certificates = RouteCertificates::from_secret(&secret);

        let mut route = Route::default();
        apply_route(&mut route, &app, &settings(None), Some(&certificates));

        assert_eq!(route.spec.path.as_deref(), Some("/api"));
        let tls = route.spec.tls.unwrap();
        assert_eq!(tls.termination, TlsTermination::Reencrypt);
        assert_eq!(tls.insecure_edge_termination_policy, Some(InsecureEdgeTerminationPolicy::Redirect));
        assert_eq!(tls.certificate.as_deref(), Some("CERT"));
        assert_eq!(tls.key.as_deref(), Some("KEY"));
        assert_eq!(tls.ca_certificate, None);
        assert_eq!(tls.destination_ca_certificate.as_deref(), Some("DEST"));
    }
}
