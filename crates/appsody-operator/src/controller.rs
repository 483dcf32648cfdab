//! # Kubernetes Controller
//!
//! Reconcile loop for `AppsodyApplication` resources

use crate::binding::{
    apply_binding_copy, apply_provider_secret, binding_secret_name, provider_secret_data,
    resolve_consumers, resolve_provider_credentials, ResolvedBindings,
};
use crate::crds::image::{self, ImageStream, ImageStreamRef};
use crate::crds::{knative, monitoring, route, AppsodyApplication, AppsodyApplicationStatus};
use crate::defaults::{self, OperatorSettings};
use crate::error::{OperatorError, Result};
use crate::metrics::Metrics;
use crate::reconciler::{
    create_or_update, create_or_update_shared, delete_owned, get_opt, release_shared,
    ClusterReader, ObjectClient, ReconcilerBase,
};
use crate::resources::{
    apply_autoscaler, apply_deployment, apply_headless_service, apply_knative_service,
    apply_route, apply_service, apply_service_account, apply_service_monitor, apply_stateful_set,
    headless_service_name, RouteCertificates,
};
use crate::watchers::{apps_for_image_stream, apps_for_pod, apps_for_secret, managed_pod_selector};
use crate::OperatorConfig;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Pod, Secret, Service, ServiceAccount};
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Config;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Requeue delay when recording a reconcile result itself fails
pub const ERROR_REQUEUE_SECONDS: u64 = 30;

/// How long discovered API groups are trusted before asking again
pub const DISCOVERY_REFRESH: Duration = Duration::from_secs(5 * 60);

/// Context passed to every reconcile
pub struct ControllerContext {
    pub base: ReconcilerBase,
    pub config: OperatorConfig,
    pub metrics: Metrics,
    pub discovery: DiscoveryCache,
}

/// Optional API groups served by the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterApis {
    pub route: bool,
    pub knative: bool,
    pub monitoring: bool,
    pub image: bool,
}

impl ClusterApis {
    pub async fn discover<C>(client: &C) -> Result<Self>
    where
        C: ObjectClient + ?Sized,
    {
        Ok(Self {
            route: client.is_group_version_supported(route::API_VERSION).await?,
            knative: client.is_group_version_supported(knative::API_VERSION).await?,
            monitoring: client.is_group_version_supported(monitoring::API_VERSION).await?,
            image: client.is_group_version_supported(image::API_VERSION).await?,
        })
    }
}

/// [`ClusterApis`] shared by all reconciles, rediscovered once `ttl` has passed
pub struct DiscoveryCache {
    ttl: Duration,
    cached: RwLock<Option<(ClusterApis, Instant)>>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub async fn get<C>(&self, client: &C) -> Result<ClusterApis>
    where
        C: ObjectClient + ?Sized,
    {
        let cached = *self.cached.read().await;
        if let Some((apis, discovered_at)) = cached {
            if discovered_at.elapsed() < self.ttl {
                return Ok(apis);
            }
        }

        let apis = ClusterApis::discover(client).await?;
        if cached.map(|(previous, _)| previous) != Some(apis) {
            info!(
                route = apis.route,
                knative = apis.knative,
                monitoring = apis.monitoring,
                image = apis.image,
                "Discovered optional APIs"
            );
        }
        *self.cached.write().await = Some((apis, Instant::now()));
        Ok(apis)
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Changes worth a reconcile: the generation (spec edits) plus labels and
/// annotations, which are copied to the children but do not bump it.
/// Status-only updates hash the same and are dropped.
fn spec_or_metadata_changed(app: &AppsodyApplication) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    app.metadata.generation.hash(&mut hasher);
    app.metadata.labels.hash(&mut hasher);
    app.metadata.annotations.hash(&mut hasher);
    Some(hasher.finish())
}

/// Reflector-backed application stream that ignores status-only updates
fn application_stream(
    api: Api<AppsodyApplication>,
) -> (
    Store<AppsodyApplication>,
    impl Stream<Item = std::result::Result<AppsodyApplication, watcher::Error>>,
) {
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, Config::default()))
        .default_backoff()
        .applied_objects()
        .predicate_filter(spec_or_metadata_changed);
    (reader, stream)
}

/// Start the AppsodyApplication controller and run it until the watch ends
pub async fn run_controller(client: Client, config: OperatorConfig, metrics: Metrics) -> Result<()> {
    let ctx = Arc::new(ControllerContext {
        base: ReconcilerBase::new(client.clone()),
        config,
        metrics,
        discovery: DiscoveryCache::new(DISCOVERY_REFRESH),
    });
    // Watches are fixed for the life of the controller; reconciles pick up
    // API groups installed later through the refreshed discovery.
    let apis = ctx.discovery.get(&ctx.base).await?;
    let namespace = ctx.config.watch_namespace.clone();
    let ns = namespace.as_deref();

    info!(
        namespace = ns.unwrap_or("all"),
        route = apis.route,
        knative = apis.knative,
        monitoring = apis.monitoring,
        image = apis.image,
        "Starting AppsodyApplication controller"
    );

    let (store, stream) = application_stream(scoped_api(&client, ns));
    let mut controller = Controller::for_stream(stream, store.clone())
        .owns(scoped_api::<Deployment>(&client, ns), Config::default())
        .owns(scoped_api::<StatefulSet>(&client, ns), Config::default())
        .owns(scoped_api::<Service>(&client, ns), Config::default())
        .owns(scoped_api::<ServiceAccount>(&client, ns), Config::default())
        .owns(scoped_api::<HorizontalPodAutoscaler>(&client, ns), Config::default())
        .owns(scoped_api::<Secret>(&client, ns), Config::default());

    if apis.route {
        controller = controller.owns(scoped_api::<route::Route>(&client, ns), Config::default());
    }
    if apis.knative {
        controller = controller.owns(scoped_api::<knative::Service>(&client, ns), Config::default());
    }
    if apis.monitoring {
        controller = controller.owns(
            scoped_api::<monitoring::ServiceMonitor>(&client, ns),
            Config::default(),
        );
    }

    controller = controller.watches(
        scoped_api::<Pod>(&client, ns),
        Config::default().labels(&managed_pod_selector()),
        |pod| apps_for_pod(&pod),
    );

    let secret_store = store.clone();
    controller = controller.watches(
        scoped_api::<Secret>(&client, ns),
        Config::default(),
        move |secret| apps_for_secret(&secret, &secret_store.state()),
    );

    if apis.image {
        let image_store = store.clone();
        controller = controller.watches(
            scoped_api::<ImageStream>(&client, ns),
            Config::default(),
            move |stream| apps_for_image_stream(&stream, &image_store.state()),
        );
    }

    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(object = %obj, ?action, "Reconciliation completed");
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}

/// Reconcile one application and record the outcome on its status
#[instrument(skip(app, ctx), fields(name = %app.name_any(), namespace = app.namespace().as_deref()))]
async fn reconcile(app: Arc<AppsodyApplication>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = Instant::now();
    let mut instance = (*app).clone();
    let mut status = instance.status.clone().unwrap_or_default();

    let result = reconcile_children(&ctx, &mut instance, &mut status).await;

    match result {
        Ok(()) => {
            ctx.base.manage_success(&instance, status).await?;
            ctx.metrics.record_success(start.elapsed());
            info!("Reconciled");
            Ok(Action::requeue(ctx.config.resync_interval))
        }
        Err(e) => {
            ctx.metrics.record_failure(e.reason(), start.elapsed());
            let retry = ctx.base.manage_error(&instance, status, &e).await?;
            if e.is_retryable() {
                Ok(Action::requeue(retry))
            } else {
                Ok(Action::await_change())
            }
        }
    }
}

async fn reconcile_children(
    ctx: &ControllerContext,
    app: &mut AppsodyApplication,
    status: &mut AppsodyApplicationStatus,
) -> Result<()> {
    let apis = ctx.discovery.get(&ctx.base).await?;
    let settings = prepare(&ctx.base, &ctx.config, &apis, app, status).await?;
    apply_children(&ctx.base, &apis, app, &settings, status).await
}

/// Normalize the spec and resolve the image to run
async fn prepare<C>(
    client: &C,
    config: &OperatorConfig,
    apis: &ClusterApis,
    app: &mut AppsodyApplication,
    status: &mut AppsodyApplicationStatus,
) -> Result<OperatorSettings>
where
    C: ObjectClient + ?Sized,
{
    let namespace = app.namespace().unwrap_or_default();
    let operator_namespace = config
        .operator_namespace
        .clone()
        .unwrap_or_else(|| namespace.clone());

    let layers = defaults::load_layers(client, &operator_namespace, &app.spec.stack).await?;
    let settings = defaults::load_settings(client, &operator_namespace).await?;
    defaults::init_and_validate(app, &layers)?;

    status.image_reference = resolve_image(client, apis, app).await?;
    app.status = Some(status.clone());
    Ok(settings)
}

/// Latest image of the ImageStream tag the application refers to, if any
async fn resolve_image<C>(client: &C, apis: &ClusterApis, app: &AppsodyApplication) -> Result<Option<String>>
where
    C: ObjectClient + ?Sized,
{
    let namespace = app.namespace().unwrap_or_default();
    let Some(reference) = ImageStreamRef::parse(&app.spec.application_image, &namespace) else {
        return Ok(None);
    };
    if !apis.image {
        return Ok(None);
    }

    let stream: Option<ImageStream> = get_opt(client, &reference.namespace, &reference.name).await?;
    let resolved = stream.and_then(|s| s.latest_reference(&reference.tag));
    debug!(
        stream = %reference.name,
        tag = %reference.tag,
        resolved = ?resolved,
        "Resolved image stream"
    );
    Ok(resolved)
}

/// Create, update or delete every child object of the application. Only
/// objects the application controls are ever deleted.
async fn apply_children<C>(
    client: &C,
    apis: &ClusterApis,
    app: &AppsodyApplication,
    settings: &OperatorSettings,
    status: &mut AppsodyApplicationStatus,
) -> Result<()>
where
    C: ObjectClient + ?Sized,
{
    let name = app.name_any();

    if app
        .spec
        .service_account_name
        .as_ref()
        .map_or(true, |n| n.is_empty())
    {
        create_or_update::<ServiceAccount, _, _>(client, app, &name, |sa| apply_service_account(sa, app))
            .await?;
    } else {
        delete_owned::<ServiceAccount, _>(client, app, &name).await?;
    }

    let bindings = apply_bindings(client, app, status).await?;

    if app.uses_knative() {
        if !apis.knative {
            return Err(OperatorError::ApiUnavailable(knative::API_VERSION.to_string()));
        }
        create_or_update::<knative::Service, _, _>(client, app, &name, |ksvc| {
            apply_knative_service(ksvc, app, &bindings.wiring)
        })
        .await?;

        delete_owned::<Deployment, _>(client, app, &name).await?;
        delete_owned::<StatefulSet, _>(client, app, &name).await?;
        delete_owned::<Service, _>(client, app, &name).await?;
        delete_owned::<Service, _>(client, app, &headless_service_name(app)).await?;
        delete_owned::<HorizontalPodAutoscaler, _>(client, app, &name).await?;
        if apis.route {
            delete_owned::<route::Route, _>(client, app, &name).await?;
        }
        if apis.monitoring {
            delete_owned::<monitoring::ServiceMonitor, _>(client, app, &name).await?;
        }
        return Ok(());
    }
    if apis.knative {
        delete_owned::<knative::Service, _>(client, app, &name).await?;
    }

    create_or_update::<Service, _, _>(client, app, &name, |svc| apply_service(svc, app)).await?;

    if app.uses_storage() {
        create_or_update::<Service, _, _>(client, app, &headless_service_name(app), |svc| {
            apply_headless_service(svc, app)
        })
        .await?;
        create_or_update::<StatefulSet, _, _>(client, app, &name, |sts| {
            apply_stateful_set(sts, app, &bindings.wiring)
        })
        .await?;
        delete_owned::<Deployment, _>(client, app, &name).await?;
    } else {
        create_or_update::<Deployment, _, _>(client, app, &name, |deploy| {
            apply_deployment(deploy, app, &bindings.wiring)
        })
        .await?;
        delete_owned::<StatefulSet, _>(client, app, &name).await?;
        delete_owned::<Service, _>(client, app, &headless_service_name(app)).await?;
    }

    if app.spec.autoscaling.is_some() {
        create_or_update::<HorizontalPodAutoscaler, _, _>(client, app, &name, |hpa| {
            apply_autoscaler(hpa, app)
        })
        .await?;
    } else {
        delete_owned::<HorizontalPodAutoscaler, _>(client, app, &name).await?;
    }

    if apis.route {
        if app.is_exposed() {
            let certificates = route_certificates(client, app).await?;
            create_or_update::<route::Route, _, _>(client, app, &name, |r| {
                apply_route(r, app, settings, certificates.as_ref())
            })
            .await?;
        } else {
            delete_owned::<route::Route, _>(client, app, &name).await?;
        }
    } else if app.is_exposed() {
        warn!(api = route::API_VERSION, "Route API unavailable, application is not exposed");
    }

    if apis.monitoring {
        if app.spec.monitoring.is_some() {
            create_or_update::<monitoring::ServiceMonitor, _, _>(client, app, &name, |sm| {
                apply_service_monitor(sm, app)
            })
            .await?;
        } else {
            delete_owned::<monitoring::ServiceMonitor, _>(client, app, &name).await?;
        }
    } else if app.spec.monitoring.is_some() {
        warn!(api = monitoring::API_VERSION, "ServiceMonitor API unavailable, monitoring skipped");
    }

    Ok(())
}

/// Publish the provider secret, copy consumed secrets into the namespace and
/// release copies that are no longer consumed. Copies are shared by every
/// consumer in the namespace and go away with the last of them.
async fn apply_bindings<C>(
    client: &C,
    app: &AppsodyApplication,
    status: &mut AppsodyApplicationStatus,
) -> Result<ResolvedBindings>
where
    C: ObjectClient + ?Sized,
{
    let namespace = app.namespace().unwrap_or_default();
    let provider_secret = binding_secret_name(&namespace, &app.name_any());

    let provides = app.spec.service.as_ref().and_then(|s| s.provides.as_ref());
    if provides.is_some() {
        let credentials = resolve_provider_credentials(client, app).await?;
        let data = provider_secret_data(app, &credentials);
        create_or_update::<Secret, _, _>(client, app, &provider_secret, |secret| {
            apply_provider_secret(secret, app, &data)
        })
        .await?;
    } else {
        delete_owned::<Secret, _>(client, app, &provider_secret).await?;
    }

    let resolved = resolve_consumers(client, app).await?;
    for binding in &resolved.consumed {
        if let Some(source) = &binding.copy_from {
            create_or_update_shared::<Secret, _, _>(client, app, &binding.secret_name, |secret| {
                apply_binding_copy(secret, source)
            })
            .await?;
        }
    }

    let current: Vec<&str> = resolved.consumed.iter().map(|b| b.secret_name.as_str()).collect();
    let previous: Vec<String> = status
        .consumed_services
        .iter()
        .flat_map(|services| services.values().flatten().cloned())
        .collect();
    for stale in previous.iter().filter(|name| !current.contains(&name.as_str())) {
        if stale != &provider_secret {
            release_shared::<Secret, _>(client, app, stale).await?;
        }
    }

    status.consumed_services = resolved.consumed_services();
    Ok(resolved)
}

async fn route_certificates<C>(client: &C, app: &AppsodyApplication) -> Result<Option<RouteCertificates>>
where
    C: ClusterReader + ?Sized,
{
    let Some(secret_name) = app
        .spec
        .route
        .as_ref()
        .and_then(|r| r.certificate_secret_ref.as_ref())
        .filter(|n| !n.is_empty())
    else {
        return Ok(None);
    };
    let namespace = app.namespace().unwrap_or_default();
    let secret = client
        .secret(&namespace, secret_name)
        .await?
        .ok_or_else(|| OperatorError::not_found("Secret", secret_name, &namespace))?;
    Ok(Some(RouteCertificates::from_secret(&secret)))
}

/// Called when recording the reconcile outcome itself failed
fn error_policy(
    app: Arc<AppsodyApplication>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> Action {
    warn!(
        name = %app.name_any(),
        namespace = app.namespace().as_deref(),
        error = %error,
        "Reconcile error, retrying in {}s",
        ERROR_REQUEUE_SECONDS
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECONDS))
}
