//! # Service binding
//!
//! Applications publish how to reach them through a binding Secret named
//! `<namespace>-<name>`, and consume other applications by having those
//! Secrets injected as environment variables or mounted as files.

use crate::crds::{
    AppsodyApplication, ServiceBindingCategory, ServiceBindingConsumes, LABEL_MANAGED_BY, OPERATOR_NAME,
};
use crate::error::{OperatorError, Result};
use crate::reconciler::ClusterReader;
use crate::resources::apply_metadata;
use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, Secret, SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

pub const KEY_CONTEXT: &str = "context";
pub const KEY_HOSTNAME: &str = "hostname";
pub const KEY_PORT: &str = "port";
pub const KEY_PROTOCOL: &str = "protocol";
pub const KEY_URL: &str = "url";
pub const KEY_USERNAME: &str = "username";
pub const KEY_PASSWORD: &str = "password";

const DEFAULT_PROTOCOL: &str = "http";

/// Name of the binding Secret published by `name` in `namespace`
pub fn binding_secret_name(namespace: &str, name: &str) -> String {
    format!("{}-{}", namespace, name)
}

/// Environment variable exposing one key of a consumed binding
pub fn binding_env_name(namespace: &str, name: &str, key: &str) -> String {
    format!("{}_{}_{}", namespace, name, key)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Credentials published alongside the endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Read the credentials referenced by `service.provides.auth` from the
/// application namespace
pub async fn resolve_provider_credentials<R>(
    reader: &R,
    app: &AppsodyApplication,
) -> Result<ProviderCredentials>
where
    R: ClusterReader + ?Sized,
{
    let namespace = app.namespace().unwrap_or_default();
    let Some(auth) = app
        .spec
        .service
        .as_ref()
        .and_then(|s| s.provides.as_ref())
        .and_then(|p| p.auth.as_ref())
    else {
        return Ok(ProviderCredentials::default());
    };

    Ok(ProviderCredentials {
        username: read_selector(reader, &namespace, auth.username.as_ref()).await?,
        password: read_selector(reader, &namespace, auth.password.as_ref()).await?,
    })
}

async fn read_selector<R>(
    reader: &R,
    namespace: &str,
    selector: Option<&SecretKeySelector>,
) -> Result<Option<String>>
where
    R: ClusterReader + ?Sized,
{
    let Some(selector) = selector else {
        return Ok(None);
    };
    let name = selector.name.clone().unwrap_or_default();
    let secret = match reader.secret(namespace, &name).await? {
        Some(secret) => secret,
        None if selector.optional == Some(true) => return Ok(None),
        None => return Err(OperatorError::not_found("Secret", &name, namespace)),
    };
    match secret_value(&secret, &selector.key) {
        Some(value) => Ok(Some(value)),
        None if selector.optional == Some(true) => Ok(None),
        None => Err(OperatorError::InvalidConfig(format!(
            "Secret {}/{} has no key {}",
            namespace, name, selector.key
        ))),
    }
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .or_else(|| secret.string_data.as_ref().and_then(|data| data.get(key).cloned()))
}

fn secret_keys(secret: &Secret) -> Vec<String> {
    let mut keys: Vec<String> = secret.data.iter().flat_map(|d| d.keys().cloned()).collect();
    keys.extend(secret.string_data.iter().flat_map(|d| d.keys().cloned()));
    keys.sort();
    keys.dedup();
    keys
}

/// Contents of the Secret an application publishes through `service.provides`
pub fn provider_secret_data(
    app: &AppsodyApplication,
    credentials: &ProviderCredentials,
) -> BTreeMap<String, String> {
    let provides = app
        .spec
        .service
        .as_ref()
        .and_then(|s| s.provides.clone())
        .unwrap_or_default();

    let hostname = format!(
        "{}.{}.svc.cluster.local",
        app.name_any(),
        app.namespace().unwrap_or_default()
    );
    let port = app.service_port().to_string();
    let protocol = provides
        .protocol
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
    let context = provides.context.unwrap_or_default();

    let mut url = format!("{}://{}:{}", protocol, hostname, port);
    let path = context.trim_start_matches('/');
    if !path.is_empty() {
        url.push('/');
        url.push_str(path);
    }

    let mut data = BTreeMap::from([
        (KEY_CONTEXT.to_string(), context),
        (KEY_HOSTNAME.to_string(), hostname),
        (KEY_PORT.to_string(), port),
        (KEY_PROTOCOL.to_string(), protocol),
        (KEY_URL.to_string(), url),
    ]);
    if let Some(username) = &credentials.username {
        data.insert(KEY_USERNAME.to_string(), username.clone());
    }
    if let Some(password) = &credentials.password {
        data.insert(KEY_PASSWORD.to_string(), password.clone());
    }
    data
}

/// Write the provider binding Secret
pub fn apply_provider_secret(
    secret: &mut Secret,
    app: &AppsodyApplication,
    data: &BTreeMap<String, String>,
) {
    apply_metadata(&mut secret.metadata, app);
    secret.type_ = Some("Opaque".to_string());
    secret.string_data = None;
    secret.data = Some(
        data.iter()
            .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
            .collect(),
    );
}

/// Write a consumer-side copy of a binding Secret from another namespace.
/// Every consumer in the namespace writes the same copy, so nothing about
/// the individual consumer ends up on it.
pub fn apply_binding_copy(secret: &mut Secret, source: &Secret) {
    secret
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    secret.type_ = source.type_.clone();
    secret.data = source.data.clone();
    secret.string_data = source.string_data.clone();
}

/// Env vars, volumes and mounts added to the application container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingWiring {
    pub env: Vec<EnvVar>,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
}

/// A binding Secret consumed by the application
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedBinding {
    pub category: ServiceBindingCategory,
    pub provider_namespace: String,
    pub provider_name: String,
    pub secret_name: String,
    /// Source Secret when it lives in another namespace and must be copied
    pub copy_from: Option<Secret>,
}

/// Everything `service.consumes` resolved to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedBindings {
    pub wiring: BindingWiring,
    pub consumed: Vec<ConsumedBinding>,
}

impl ResolvedBindings {
    /// Value of `status.consumedServices`
    pub fn consumed_services(&self) -> Option<BTreeMap<String, Vec<String>>> {
        if self.consumed.is_empty() {
            return None;
        }
        let mut services: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for binding in &self.consumed {
            services
                .entry(binding.category.as_str().to_string())
                .or_default()
                .push(binding.secret_name.clone());
        }
        Some(services)
    }
}

/// Look up every consumed binding Secret and build the container wiring.
/// A missing Secret fails the whole resolution so the reconcile is retried
/// once the provider has published it.
pub async fn resolve_consumers<R>(reader: &R, app: &AppsodyApplication) -> Result<ResolvedBindings>
where
    R: ClusterReader + ?Sized,
{
    let namespace = app.namespace().unwrap_or_default();
    let consumes = app
        .spec
        .service
        .as_ref()
        .and_then(|s| s.consumes.clone())
        .unwrap_or_default();

    let mut resolved = ResolvedBindings::default();
    for entry in &consumes {
        let provider_namespace = entry
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| namespace.clone());
        let secret_name = binding_secret_name(&provider_namespace, &entry.name);

        let source = reader
            .secret(&provider_namespace, &secret_name)
            .await?
            .ok_or_else(|| OperatorError::not_found("Secret", &secret_name, &provider_namespace))?;
        debug!(secret = %secret_name, provider_namespace = %provider_namespace, "Resolved binding");

        wire(&mut resolved.wiring, entry, &provider_namespace, &secret_name, &source);
        resolved.consumed.push(ConsumedBinding {
            category: entry.category,
            provider_namespace: provider_namespace.clone(),
            provider_name: entry.name.clone(),
            secret_name,
            copy_from: (provider_namespace != namespace).then_some(source),
        });
    }
    Ok(resolved)
}

fn wire(
    wiring: &mut BindingWiring,
    entry: &ServiceBindingConsumes,
    provider_namespace: &str,
    secret_name: &str,
    source: &Secret,
) {
    match entry.mount_path.as_deref().filter(|p| !p.is_empty()) {
        Some(mount_path) => {
            wiring.volumes.push(Volume {
                name: secret_name.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret_name.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            wiring.volume_mounts.push(VolumeMount {
                name: secret_name.to_string(),
                mount_path: format!(
                    "{}/{}/{}",
                    mount_path.trim_end_matches('/'),
                    provider_namespace,
                    entry.name
                ),
                read_only: Some(true),
                ..Default::default()
            });
        }
        None => {
            for key in secret_keys(source) {
                wiring.env.push(EnvVar {
                    name: binding_env_name(provider_namespace, &entry.name, &key),
                    value: None,
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: Some(secret_name.to_string()),
                            key,
                            optional: None,
                        }),
                        ..Default::default()
                    }),
                });
            }
        }
    }
}
