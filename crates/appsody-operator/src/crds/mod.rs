//! # Custom Resource Definitions
//!
//! The `AppsodyApplication` resource reconciled by this operator, plus typed
//! bindings for the third-party resources it creates or reads.

pub mod image;
pub mod knative;
pub mod monitoring;
pub mod route;

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, PersistentVolumeClaim, Probe, ResourceRequirements,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of `app.kubernetes.io/managed-by` on every generated object
pub const OPERATOR_NAME: &str = "appsody-operator";

pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
pub const LABEL_STACK: &str = "stack.appsody.dev/id";
pub const LABEL_APP_NAV: &str = "kappnav.app.auto-create";
pub const LABEL_MONITOR_ENABLED: &str = "monitor.appsody.dev/enabled";

const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// AppsodyApplication - an application built from an Appsody stack
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "appsody.dev",
    version = "v1beta1",
    kind = "AppsodyApplication",
    plural = "appsodyapplications",
    shortname = "app",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
#[kube(status = "AppsodyApplicationStatus")]
#[kube(
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.applicationImage"}"#,
    printcolumn = r#"{"name":"Exposed","type":"boolean","jsonPath":".spec.expose"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"string","jsonPath":".status.conditions[?(@.type=='Reconciled')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppsodyApplicationSpec {
    /// Application version, surfaced as `app.kubernetes.io/version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Container image, or an ImageStream reference on OpenShift
    #[serde(default)]
    pub application_image: String,

    /// Number of pods; ignored when autoscaling is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoScalingSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<PullPolicy>,

    /// Name of the image pull secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_constraints: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSpec>,

    /// Expose the application outside the cluster through a Route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    /// Existing service account to run pods as. When unset a service account
    /// named after the application is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Allowed node architectures, most preferred first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_knative_service: Option<bool>,

    /// Appsody stack the application was built from
    #[serde(default)]
    pub stack: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_app_definition: Option<bool>,

    /// Logical application grouping, surfaced as `app.kubernetes.io/part-of`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_containers: Option<Vec<Container>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_containers: Option<Vec<Container>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteSpec>,
}

/// Pull policy for container images
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum PullPolicy {
    #[default]
    #[serde(rename = "IfNotPresent")]
    IfNotPresent,

    #[serde(rename = "Always")]
    Always,

    #[serde(rename = "Never")]
    Never,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::IfNotPresent => "IfNotPresent",
            PullPolicy::Always => "Always",
            PullPolicy::Never => "Never",
        }
    }
}

/// Horizontal pod autoscaling
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    #[serde(
        default,
        rename = "targetCPUUtilizationPercentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_cpu_utilization_percentage: Option<i32>,
}

/// Service configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<ServiceType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Container port; defaults to `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides: Option<ServiceBindingProvides>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumes: Option<Vec<ServiceBindingConsumes>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
            ServiceType::ExternalName => "ExternalName",
        }
    }

    /// Whether a node port may be requested for this service type
    pub fn allows_node_port(&self) -> bool {
        matches!(self, ServiceType::NodePort | ServiceType::LoadBalancer)
    }
}

/// Binding category; only OpenAPI endpoints are supported
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema, Default)]
pub enum ServiceBindingCategory {
    #[default]
    #[serde(rename = "openapi")]
    OpenApi,
}

impl ServiceBindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceBindingCategory::OpenApi => "openapi",
        }
    }
}

/// Endpoint published by this application for others to consume
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingProvides {
    #[serde(default)]
    pub category: ServiceBindingCategory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ServiceBindingAuth>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKeySelector>,
}

/// Endpoint of another application consumed by this one
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingConsumes {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub category: ServiceBindingCategory,

    /// Mount the binding secret here instead of injecting env vars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

/// Persistent storage; switches the workload to a StatefulSet
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage size (e.g., "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<PersistentVolumeClaim>,
}

/// Prometheus scraping configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "monitoring::endpoints_schema")]
    pub endpoints: Option<Vec<monitoring::Endpoint>>,
}

/// OpenShift Route configuration
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<route::TlsTermination>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<route::InsecureEdgeTerminationPolicy>,

    /// Secret holding `tls.crt`, `tls.key`, `ca.crt` and `destCA.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_secret_ref: Option<String>,
}

/// Application status
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppsodyApplicationStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,

    /// Binding secret names per category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_services: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    Reconciled,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl AppsodyApplicationStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&StatusCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Replace the condition of the same type, keeping the transition time
    /// when the status did not change.
    pub fn set_condition(&mut self, mut condition: StatusCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time.clone();
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

impl AppsodyApplication {
    /// Labels applied to every object generated for this application
    pub fn labels(&self) -> BTreeMap<String, String> {
        let name = self.name_any();
        let mut labels = self.metadata.labels.clone().unwrap_or_default();

        labels.insert(LABEL_INSTANCE.to_string(), name.clone());
        labels.insert(LABEL_NAME.to_string(), name.clone());
        labels.insert(LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
        labels.insert(LABEL_COMPONENT.to_string(), "backend".to_string());
        labels.insert(
            LABEL_PART_OF.to_string(),
            self.spec.application_name.clone().unwrap_or(name),
        );
        if !self.spec.stack.is_empty() {
            labels.insert(LABEL_STACK.to_string(), self.spec.stack.clone());
        }
        if let Some(version) = &self.spec.version {
            labels.insert(LABEL_VERSION.to_string(), version.clone());
        }
        if self.spec.create_app_definition.unwrap_or(true) {
            labels.insert(LABEL_APP_NAV.to_string(), "true".to_string());
        }
        labels
    }

    /// Labels used in pod selectors; must stay stable across spec changes
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_INSTANCE.to_string(), self.name_any())])
    }

    /// Annotations propagated to generated objects
    pub fn annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = self.metadata.annotations.clone().unwrap_or_default();
        annotations.remove(LAST_APPLIED_ANNOTATION);
        annotations
    }

    /// Image to run: the resolved ImageStream reference when known
    pub fn image(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.image_reference.clone())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.spec.application_image.clone())
    }

    pub fn service_port(&self) -> i32 {
        self.spec
            .service
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(crate::defaults::DEFAULT_SERVICE_PORT)
    }

    pub fn container_port(&self) -> i32 {
        self.spec
            .service
            .as_ref()
            .and_then(|s| s.target_port)
            .unwrap_or_else(|| self.service_port())
    }

    /// Name of the Service port, also used by Route and ServiceMonitor
    pub fn service_port_name(&self) -> String {
        self.spec
            .service
            .as_ref()
            .and_then(|s| s.port_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}-tcp", self.service_port()))
    }

    pub fn uses_storage(&self) -> bool {
        self.spec.storage.is_some()
    }

    pub fn uses_knative(&self) -> bool {
        self.spec.create_knative_service.unwrap_or(false)
    }

    pub fn is_exposed(&self) -> bool {
        self.spec.expose.unwrap_or(false)
    }

    /// Service account the pods run as
    pub fn service_account(&self) -> String {
        self.spec
            .service_account_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::CustomResourceExt;

    fn app(spec: AppsodyApplicationSpec) -> AppsodyApplication {
        AppsodyApplication {
            metadata: ObjectMeta {
                name: Some("frontend".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_crd_generation() {
        let crd = AppsodyApplication::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("appsodyapplications.appsody.dev"));
        assert_eq!(crd.spec.group, "appsody.dev");
        assert_eq!(crd.spec.names.kind, "AppsodyApplication");
        assert_eq!(crd.spec.names.short_names, Some(vec!["app".to_string()]));
        assert_eq!(crd.spec.versions[0].name, "v1beta1");
    }

    #[test]
    fn test_crd_preserves_endpoint_fields() {
        let crd = serde_json::to_value(AppsodyApplication::crd()).unwrap();
        let endpoints = crd
            .pointer("/spec/versions/0/schema/openAPIV3Schema/properties/spec/properties/monitoring/properties/endpoints")
            .unwrap();
        assert_eq!(endpoints["type"], "array");
        assert_eq!(endpoints["items"]["type"], "object");
        assert_eq!(endpoints["items"]["x-kubernetes-preserve-unknown-fields"], true);

        let spec: AppsodyApplicationSpec = serde_json::from_value(serde_json::json!({
            "applicationImage": "quay.io/shop/frontend:1.0",
            "monitoring": {"endpoints": [{"port": "web", "tlsConfig": {"insecureSkipVerify": true}}]}
        }))
        .unwrap();
        let endpoint = &spec.monitoring.unwrap().endpoints.unwrap()[0];
        assert_eq!(endpoint.extra["tlsConfig"]["insecureSkipVerify"], true);
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: AppsodyApplicationSpec = serde_json::from_value(serde_json::json!({
            "applicationImage": "quay.io/shop/frontend:1.0",
            "stack": "nodejs-express",
            "autoscaling": {"maxReplicas": 5, "targetCPUUtilizationPercentage": 60},
            "service": {"type": "NodePort", "port": 3000, "consumes": [{"name": "orders"}]},
            "pullPolicy": "Always",
            "route": {"termination": "edge", "insecureEdgeTerminationPolicy": "Redirect"}
        }))
        .unwrap();

        assert_eq!(spec.application_image, "quay.io/shop/frontend:1.0");
        let autoscaling = spec.autoscaling.unwrap();
        assert_eq!(autoscaling.max_replicas, Some(5));
        assert_eq!(autoscaling.target_cpu_utilization_percentage, Some(60));
        let service = spec.service.unwrap();
        assert_eq!(service.type_, Some(ServiceType::NodePort));
        assert_eq!(service.consumes.unwrap()[0].category, ServiceBindingCategory::OpenApi);
        assert_eq!(spec.pull_policy, Some(PullPolicy::Always));
        assert_eq!(spec.route.unwrap().termination, Some(route::TlsTermination::Edge));
    }

    #[test]
    fn test_labels() {
        let mut spec = AppsodyApplicationSpec {
            stack: "java-microprofile".to_string(),
            version: Some("2.1".to_string()),
            ..Default::default()
        };
        spec.application_name = Some("shop".to_string());
        let mut app = app(spec);
        app.metadata.labels = Some(BTreeMap::from([
            ("team".to_string(), "web".to_string()),
            (LABEL_MANAGED_BY.to_string(), "someone-else".to_string()),
        ]));

        let labels = app.labels();
        assert_eq!(labels.get(LABEL_INSTANCE).map(String::as_str), Some("frontend"));
        assert_eq!(labels.get(LABEL_MANAGED_BY).map(String::as_str), Some(OPERATOR_NAME));
        assert_eq!(labels.get(LABEL_PART_OF).map(String::as_str), Some("shop"));
        assert_eq!(labels.get(LABEL_STACK).map(String::as_str), Some("java-microprofile"));
        assert_eq!(labels.get(LABEL_VERSION).map(String::as_str), Some("2.1"));
        assert_eq!(labels.get(LABEL_APP_NAV).map(String::as_str), Some("true"));
        assert_eq!(labels.get("team").map(String::as_str), Some("web"));
        assert_eq!(app.selector_labels().len(), 1);
    }

    #[test]
    fn test_annotations_drop_last_applied() {
        let mut app = app(AppsodyApplicationSpec::default());
        app.metadata.annotations = Some(BTreeMap::from([
            (LAST_APPLIED_ANNOTATION.to_string(), "{}".to_string()),
            ("owner".to_string(), "web-team".to_string()),
        ]));
        let annotations = app.annotations();
        assert_eq!(annotations.len(), 1);
        assert!(annotations.contains_key("owner"));
    }

    #[test]
    fn test_port_helpers() {
        let app = app(AppsodyApplicationSpec {
            service: Some(ServiceSpec {
                port: Some(9080),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(app.service_port(), 9080);
        assert_eq!(app.container_port(), 9080);
        assert_eq!(app.service_port_name(), "9080-tcp");
    }

    #[test]
    fn test_image_prefers_resolved_reference() {
        let mut app = app(AppsodyApplicationSpec {
            application_image: "frontend:latest".to_string(),
            ..Default::default()
        });
        assert_eq!(app.image(), "frontend:latest");
        app.status = Some(AppsodyApplicationStatus {
            image_reference: Some("registry/shop/frontend@sha256:abc".to_string()),
            ..Default::default()
        });
        assert_eq!(app.image(), "registry/shop/frontend@sha256:abc");
    }

    #[test]
    fn test_set_condition_keeps_transition_time() {
        let earlier = Time(chrono::Utc::now() - chrono::Duration::minutes(5));
        let mut status = AppsodyApplicationStatus::default();
        status.set_condition(StatusCondition {
            type_: ConditionType::Reconciled,
            status: ConditionStatus::True,
            last_transition_time: Some(earlier.clone()),
            last_update_time: Some(earlier.clone()),
            reason: None,
            message: None,
        });

        let now = Time(chrono::Utc::now());
        status.set_condition(StatusCondition {
            type_: ConditionType::Reconciled,
            status: ConditionStatus::True,
            last_transition_time: Some(now.clone()),
            last_update_time: Some(now.clone()),
            reason: None,
            message: None,
        });
        let condition = status.condition(ConditionType::Reconciled).unwrap();
        assert_eq!(condition.last_transition_time, Some(earlier));
        assert_eq!(condition.last_update_time, Some(now.clone()));

        status.set_condition(StatusCondition {
            type_: ConditionType::Reconciled,
            status: ConditionStatus::False,
            last_transition_time: Some(now.clone()),
            last_update_time: Some(now.clone()),
            reason: Some("Failed".to_string()),
            message: None,
        });
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, Some(now));
    }
}
