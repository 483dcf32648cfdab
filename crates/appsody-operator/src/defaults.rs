//! # Spec normalization
//!
//! Merges the three configuration layers into the effective spec of an
//! application:
//!
//! 1. fields set on the `AppsodyApplication` itself
//! 2. the per-stack entry of the `appsody-operator-defaults` ConfigMap, used
//!    only where the application leaves a field unset
//! 3. the per-stack entry of the `appsody-operator-constants` ConfigMap,
//!    which always wins
//!
//! Each ConfigMap key is a stack name holding a YAML fragment of
//! [`AppsodyApplicationSpec`]. The `generic` key applies to stacks without
//! their own entry.

use crate::crds::{
    AppsodyApplication, AppsodyApplicationSpec, AutoScalingSpec, PullPolicy, RouteSpec,
    ServiceSpec, ServiceType,
};
use crate::error::{OperatorError, Result};
use crate::reconciler::ClusterReader;
use k8s_openapi::api::core::v1::{ConfigMap, EnvFromSource};
use tracing::{debug, warn};

pub const DEFAULTS_CONFIGMAP: &str = "appsody-operator-defaults";
pub const CONSTANTS_CONFIGMAP: &str = "appsody-operator-constants";
pub const OPERATOR_CONFIGMAP: &str = "appsody-operator";

/// Stack key used when an application's stack has no entry of its own
pub const GENERIC_STACK: &str = "generic";

pub const DEFAULT_SERVICE_PORT: i32 = 8080;
pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

const DEFAULT_HOST_NAME_KEY: &str = "defaultHostName";

/// Defaults and constants resolved for one stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackLayers {
    pub defaults: AppsodyApplicationSpec,
    pub constants: Option<AppsodyApplicationSpec>,
}

impl StackLayers {
    pub fn from_config_maps(
        defaults: Option<&ConfigMap>,
        constants: Option<&ConfigMap>,
        stack: &str,
    ) -> Result<Self> {
        Ok(Self {
            defaults: parse_layer(defaults, stack)?.unwrap_or_default(),
            constants: parse_layer(constants, stack)?,
        })
    }
}

/// Cluster-wide settings from the `appsody-operator` ConfigMap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorSettings {
    /// Domain suffix for generated Route hosts
    pub default_host_name: Option<String>,
}

impl OperatorSettings {
    pub fn from_config_map(config_map: Option<&ConfigMap>) -> Self {
        let default_host_name = config_map
            .and_then(|cm| cm.data.as_ref())
            .and_then(|data| data.get(DEFAULT_HOST_NAME_KEY))
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty());
        Self { default_host_name }
    }
}

/// Load the layers for `stack` from the operator namespace. Missing
/// ConfigMaps yield empty layers.
pub async fn load_layers<R>(reader: &R, namespace: &str, stack: &str) -> Result<StackLayers>
where
    R: ClusterReader + ?Sized,
{
    let defaults = reader.config_map(namespace, DEFAULTS_CONFIGMAP).await?;
    let constants = reader.config_map(namespace, CONSTANTS_CONFIGMAP).await?;
    debug!(
        stack = %stack,
        defaults = defaults.is_some(),
        constants = constants.is_some(),
        "Loaded stack configuration"
    );
    StackLayers::from_config_maps(defaults.as_ref(), constants.as_ref(), stack)
}

pub async fn load_settings<R>(reader: &R, namespace: &str) -> Result<OperatorSettings>
where
    R: ClusterReader + ?Sized,
{
    let config_map = reader.config_map(namespace, OPERATOR_CONFIGMAP).await?;
    Ok(OperatorSettings::from_config_map(config_map.as_ref()))
}

fn parse_layer(config_map: Option<&ConfigMap>, stack: &str) -> Result<Option<AppsodyApplicationSpec>> {
    let Some(data) = config_map.and_then(|cm| cm.data.as_ref()) else {
        return Ok(None);
    };
    let raw = data
        .get(stack)
        .or_else(|| data.get(GENERIC_STACK))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    let Some(raw) = raw else {
        return Ok(None);
    };
    let layer = serde_yaml::from_str(raw).map_err(|e| {
        warn!(stack = %stack, error = %e, "Malformed stack configuration entry");
        e
    })?;
    Ok(Some(layer))
}

/// Normalize the application spec in place and validate the result
pub fn init_and_validate(app: &mut AppsodyApplication, layers: &StackLayers) -> Result<()> {
    initialize(&mut app.spec, &layers.defaults);
    if let Some(constants) = &layers.constants {
        apply_constants(&mut app.spec, constants);
    }
    apply_builtin_defaults(&mut app.spec);
    validate(&app.spec)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Defaults,
    Constants,
}

fn merge_field<T: Clone>(layer: Layer, target: &mut Option<T>, value: &Option<T>) {
    match layer {
        Layer::Defaults if target.is_none() => *target = value.clone(),
        Layer::Constants if value.is_some() => *target = value.clone(),
        _ => {}
    }
}

fn merge_service(layer: Layer, target: &mut Option<ServiceSpec>, value: &Option<ServiceSpec>) {
    let Some(value) = value else { return };
    let target = target.get_or_insert_with(ServiceSpec::default);
    merge_field(layer, &mut target.type_, &value.type_);
    merge_field(layer, &mut target.port, &value.port);
    merge_field(layer, &mut target.target_port, &value.target_port);
    merge_field(layer, &mut target.node_port, &value.node_port);
    merge_field(layer, &mut target.port_name, &value.port_name);
    merge_field(layer, &mut target.annotations, &value.annotations);
    merge_field(layer, &mut target.provides, &value.provides);
    merge_field(layer, &mut target.consumes, &value.consumes);
}

fn merge_route(layer: Layer, target: &mut Option<RouteSpec>, value: &Option<RouteSpec>) {
    let Some(value) = value else { return };
    let target = target.get_or_insert_with(RouteSpec::default);
    merge_field(layer, &mut target.annotations, &value.annotations);
    merge_field(layer, &mut target.host, &value.host);
    merge_field(layer, &mut target.path, &value.path);
    merge_field(layer, &mut target.termination, &value.termination);
    merge_field(
        layer,
        &mut target.insecure_edge_termination_policy,
        &value.insecure_edge_termination_policy,
    );
    merge_field(layer, &mut target.certificate_secret_ref, &value.certificate_secret_ref);
}

fn merge_autoscaling(
    layer: Layer,
    target: &mut Option<AutoScalingSpec>,
    value: &Option<AutoScalingSpec>,
) {
    let Some(value) = value else { return };
    // Defaults only refine autoscaling the application asked for.
    if layer == Layer::Defaults && target.is_none() {
        return;
    }
    let target = target.get_or_insert_with(AutoScalingSpec::default);
    merge_field(layer, &mut target.min_replicas, &value.min_replicas);
    merge_field(layer, &mut target.max_replicas, &value.max_replicas);
    merge_field(
        layer,
        &mut target.target_cpu_utilization_percentage,
        &value.target_cpu_utilization_percentage,
    );
}

/// Fill every field the application leaves unset from the stack defaults
pub fn initialize(spec: &mut AppsodyApplicationSpec, defaults: &AppsodyApplicationSpec) {
    let layer = Layer::Defaults;
    if spec.application_image.is_empty() {
        spec.application_image = defaults.application_image.clone();
    }
    merge_field(layer, &mut spec.version, &defaults.version);
    merge_field(layer, &mut spec.replicas, &defaults.replicas);
    merge_field(layer, &mut spec.pull_policy, &defaults.pull_policy);
    merge_field(layer, &mut spec.pull_secret, &defaults.pull_secret);
    merge_field(layer, &mut spec.service_account_name, &defaults.service_account_name);
    merge_field(layer, &mut spec.readiness_probe, &defaults.readiness_probe);
    merge_field(layer, &mut spec.liveness_probe, &defaults.liveness_probe);
    merge_field(layer, &mut spec.resource_constraints, &defaults.resource_constraints);
    merge_field(layer, &mut spec.env, &defaults.env);
    merge_field(layer, &mut spec.env_from, &defaults.env_from);
    merge_field(layer, &mut spec.volumes, &defaults.volumes);
    merge_field(layer, &mut spec.volume_mounts, &defaults.volume_mounts);
    merge_field(layer, &mut spec.architecture, &defaults.architecture);
    merge_field(layer, &mut spec.storage, &defaults.storage);
    merge_field(layer, &mut spec.monitoring, &defaults.monitoring);
    merge_field(layer, &mut spec.init_containers, &defaults.init_containers);
    merge_field(layer, &mut spec.sidecar_containers, &defaults.sidecar_containers);
    merge_field(layer, &mut spec.expose, &defaults.expose);
    merge_field(layer, &mut spec.create_knative_service, &defaults.create_knative_service);
    merge_field(layer, &mut spec.create_app_definition, &defaults.create_app_definition);
    merge_field(layer, &mut spec.application_name, &defaults.application_name);
    merge_autoscaling(layer, &mut spec.autoscaling, &defaults.autoscaling);
    merge_service(layer, &mut spec.service, &defaults.service);
    merge_route(layer, &mut spec.route, &defaults.route);
}

/// Overwrite the spec with every field present in the stack constants.
/// Identity-keyed lists are merged entry by entry instead.
pub fn apply_constants(spec: &mut AppsodyApplicationSpec, constants: &AppsodyApplicationSpec) {
    let layer = Layer::Constants;
    if !constants.application_image.is_empty() {
        spec.application_image = constants.application_image.clone();
    }
    merge_field(layer, &mut spec.version, &constants.version);
    merge_field(layer, &mut spec.replicas, &constants.replicas);
    merge_field(layer, &mut spec.pull_policy, &constants.pull_policy);
    merge_field(layer, &mut spec.pull_secret, &constants.pull_secret);
    merge_field(layer, &mut spec.service_account_name, &constants.service_account_name);
    merge_field(layer, &mut spec.readiness_probe, &constants.readiness_probe);
    merge_field(layer, &mut spec.liveness_probe, &constants.liveness_probe);
    merge_field(layer, &mut spec.resource_constraints, &constants.resource_constraints);
    merge_field(layer, &mut spec.architecture, &constants.architecture);
    merge_field(layer, &mut spec.storage, &constants.storage);
    merge_field(layer, &mut spec.monitoring, &constants.monitoring);
    merge_field(layer, &mut spec.init_containers, &constants.init_containers);
    merge_field(layer, &mut spec.sidecar_containers, &constants.sidecar_containers);
    merge_field(layer, &mut spec.expose, &constants.expose);
    merge_field(layer, &mut spec.create_knative_service, &constants.create_knative_service);
    merge_field(layer, &mut spec.create_app_definition, &constants.create_app_definition);
    merge_field(layer, &mut spec.application_name, &constants.application_name);
    merge_autoscaling(layer, &mut spec.autoscaling, &constants.autoscaling);
    merge_service(layer, &mut spec.service, &constants.service);
    merge_route(layer, &mut spec.route, &constants.route);

    merge_keyed(&mut spec.env, &constants.env, |e| e.name.clone());
    merge_keyed(&mut spec.volumes, &constants.volumes, |v| v.name.clone());
    merge_keyed(&mut spec.volume_mounts, &constants.volume_mounts, |m| m.mount_path.clone());
    merge_keyed(&mut spec.env_from, &constants.env_from, env_from_key);
}

fn env_from_key(source: &EnvFromSource) -> (Option<String>, Option<String>, Option<String>) {
    (
        source.config_map_ref.as_ref().and_then(|r| r.name.clone()),
        source.secret_ref.as_ref().and_then(|r| r.name.clone()),
        source.prefix.clone(),
    )
}

/// Replace entries sharing a key with the constant entry, append the rest
fn merge_keyed<T, K, F>(target: &mut Option<Vec<T>>, constants: &Option<Vec<T>>, key: F)
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let Some(constants) = constants else { return };
    let list = target.get_or_insert_with(Vec::new);
    for item in constants {
        let item_key = key(item);
        match list.iter_mut().find(|existing| key(existing) == item_key) {
            Some(existing) => *existing = item.clone(),
            None => list.push(item.clone()),
        }
    }
}

fn apply_builtin_defaults(spec: &mut AppsodyApplicationSpec) {
    spec.pull_policy.get_or_insert(PullPolicy::IfNotPresent);
    spec.replicas.get_or_insert(DEFAULT_REPLICAS);
    spec.expose.get_or_insert(false);
    spec.create_knative_service.get_or_insert(false);
    spec.create_app_definition.get_or_insert(true);
    if let Some(autoscaling) = spec.autoscaling.as_mut() {
        autoscaling.min_replicas.get_or_insert(DEFAULT_MIN_REPLICAS);
    }
    let service = spec.service.get_or_insert_with(ServiceSpec::default);
    service.type_.get_or_insert(ServiceType::ClusterIP);
    service.port.get_or_insert(DEFAULT_SERVICE_PORT);
}

/// Reject specs that cannot be turned into a consistent set of objects
pub fn validate(spec: &AppsodyApplicationSpec) -> Result<()> {
    let mut problems = Vec::new();

    if spec.application_image.trim().is_empty() {
        problems.push("applicationImage is required".to_string());
    }

    if let Some(autoscaling) = &spec.autoscaling {
        let min = autoscaling.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS);
        match autoscaling.max_replicas {
            None => problems.push("autoscaling.maxReplicas is required".to_string()),
            Some(max) if max < 1 => {
                problems.push("autoscaling.maxReplicas must be at least 1".to_string())
            }
            Some(max) if max < min => problems.push(format!(
                "autoscaling.maxReplicas ({}) is lower than minReplicas ({})",
                max, min
            )),
            _ => {}
        }
    }

    if let Some(storage) = &spec.storage {
        if storage.size.is_none() && storage.volume_claim_template.is_none() {
            problems.push("storage requires either size or volumeClaimTemplate".to_string());
        }
        if spec.create_knative_service.unwrap_or(false) {
            problems.push("storage cannot be used with createKnativeService".to_string());
        }
    }

    if let Some(service) = &spec.service {
        let service_type = service.type_.unwrap_or_default();
        if service.node_port.is_some() && !service_type.allows_node_port() {
            problems.push(format!(
                "service.nodePort requires type NodePort or LoadBalancer, not {}",
                service_type.as_str()
            ));
        }
        for consumed in service.consumes.iter().flatten() {
            if consumed.name.trim().is_empty() {
                problems.push("service.consumes entries require a name".to_string());
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(OperatorError::ValidationError(problems.join("; ")))
    }
}
