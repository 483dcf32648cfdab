//! # Reconciler base
//!
//! Thin layer over the Kubernetes client shared by the controller. Child
//! objects are written through [`ObjectClient`] with the create-or-update
//! pattern and owner references; status conditions are patched directly.

use crate::crds::{
    AppsodyApplication, AppsodyApplicationStatus, ConditionStatus, ConditionType, StatusCondition,
};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Field manager recorded on writes made by the operator
pub const FIELD_MANAGER: &str = "appsody-operator";

/// Upper bound for the failure retry delay
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Outcome of [`create_or_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Read access to the objects the normalizer and binding logic depend on
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
}

/// Untyped object access used to manage child resources. The typed helpers
/// in this module ([`create_or_update`], [`delete_owned`], ...) are written
/// against this trait so the orchestration can run without an API server.
#[async_trait]
pub trait ObjectClient: ClusterReader {
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn create_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()>;

    async fn replace_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        object: &DynamicObject,
    ) -> Result<()>;

    /// Returns false when the object did not exist
    async fn delete_object(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<bool>;

    /// Whether the cluster serves `group/version` (e.g. `route.openshift.io/v1`)
    async fn is_group_version_supported(&self, api_version: &str) -> Result<bool>;
}

/// Namespaced object types the operator creates and deletes
pub trait ManagedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Default
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
{
}

impl<K> ManagedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Default
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
{
}

/// Client wrapper used by the reconcile loop
#[derive(Clone)]
pub struct ReconcilerBase {
    client: Client,
}

impl ReconcilerBase {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    /// Patch the status subresource. Optional fields that are unset are
    /// cleared rather than left at their previous value.
    pub async fn update_status(
        &self,
        app: &AppsodyApplication,
        status: &AppsodyApplicationStatus,
    ) -> Result<()> {
        let namespace = owner_namespace(app)?;
        let api: Api<AppsodyApplication> = Api::namespaced(self.client.clone(), &namespace);

        let mut value = serde_json::to_value(status)?;
        if let Value::Object(fields) = &mut value {
            for key in ["consumedServices", "imageReference"] {
                fields.entry(key).or_insert(Value::Null);
            }
        }

        api.patch_status(
            &app.name_any(),
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": value })),
        )
        .await?;
        Ok(())
    }

    /// Record a successful reconcile
    pub async fn manage_success(
        &self,
        app: &AppsodyApplication,
        mut status: AppsodyApplicationStatus,
    ) -> Result<()> {
        status.set_condition(reconciled_condition(ConditionStatus::True, None, None, Utc::now()));
        status.observed_generation = app.metadata.generation;
        self.update_status(app, &status).await
    }

    /// Record a failed reconcile and return how long to wait before retrying
    pub async fn manage_error(
        &self,
        app: &AppsodyApplication,
        mut status: AppsodyApplicationStatus,
        error: &OperatorError,
    ) -> Result<Duration> {
        let now = Utc::now();
        let retry = retry_interval(status.condition(ConditionType::Reconciled), now);

        warn!(
            name = %app.name_any(),
            namespace = app.namespace().as_deref(),
            reason = error.reason(),
            error = %error,
            retry_after = ?retry,
            "Reconcile failed"
        );

        status.set_condition(reconciled_condition(
            ConditionStatus::False,
            Some(error.reason().to_string()),
            Some(error.to_string()),
            now,
        ));
        status.observed_generation = app.metadata.generation;
        self.update_status(app, &status).await?;
        Ok(retry)
    }
}

#[async_trait]
impl ClusterReader for ReconcilerBase {
    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl ObjectClient for ReconcilerBase {
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.dynamic_api(resource, namespace).get_opt(name).await?)
    }

    async fn create_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        self.dynamic_api(resource, namespace)
            .create(&write_params(), object)
            .await?;
        Ok(())
    }

    async fn replace_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        self.dynamic_api(resource, namespace)
            .replace(name, &write_params(), object)
            .await?;
        Ok(())
    }

    async fn delete_object(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<bool> {
        match self
            .dynamic_api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_group_version_supported(&self, api_version: &str) -> Result<bool> {
        match self.client.list_api_group_resources(api_version).await {
            Ok(list) => Ok(!list.resources.is_empty()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

pub(crate) fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub(crate) fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Read an object, mapping 404 to `None`
pub async fn get_opt<K, C>(client: &C, namespace: &str, name: &str) -> Result<Option<K>>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
{
    let resource = ApiResource::erase::<K>(&());
    client
        .get_object(&resource, namespace, name)
        .await?
        .map(from_dynamic)
        .transpose()
}

/// Fetch the named object (or start from an empty one), make the
/// application its controller, apply `mutate`, then create it or replace
/// it when the mutation changed anything. Fails without writing when the
/// object is already controlled by someone else.
pub async fn create_or_update<K, C, F>(
    client: &C,
    owner: &AppsodyApplication,
    name: &str,
    mutate: F,
) -> Result<OperationResult>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
    F: FnOnce(&mut K) + Send,
{
    write_child(client, owner, name, set_controller_reference, mutate).await
}

/// Like [`create_or_update`], for objects several applications may write
/// identically (cross-namespace binding copies). Each writer is recorded
/// as a plain owner and none of them becomes the controller.
pub async fn create_or_update_shared<K, C, F>(
    client: &C,
    owner: &AppsodyApplication,
    name: &str,
    mutate: F,
) -> Result<OperationResult>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
    F: FnOnce(&mut K) + Send,
{
    write_child(client, owner, name, add_owner_reference, mutate).await
}

async fn write_child<K, C, F>(
    client: &C,
    owner: &AppsodyApplication,
    name: &str,
    reference: fn(&AppsodyApplication, &mut K) -> Result<()>,
    mutate: F,
) -> Result<OperationResult>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
    F: FnOnce(&mut K) + Send,
{
    let namespace = owner_namespace(owner)?;
    let existing: Option<K> = get_opt(client, &namespace, name).await?;

    let mut desired = existing.clone().unwrap_or_default();
    desired.meta_mut().name = Some(name.to_string());
    desired.meta_mut().namespace = Some(namespace.clone());
    reference(owner, &mut desired)?;
    mutate(&mut desired);

    let resource = ApiResource::erase::<K>(&());
    let kind = K::kind(&());
    match existing {
        None => {
            client
                .create_object(&resource, &namespace, &to_dynamic(&desired)?)
                .await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "Created");
            Ok(OperationResult::Created)
        }
        Some(current) => {
            if serde_json::to_value(&current)? == serde_json::to_value(&desired)? {
                debug!(kind = %kind, name = %name, namespace = %namespace, "Unchanged");
                return Ok(OperationResult::Unchanged);
            }
            client
                .replace_object(&resource, &namespace, name, &to_dynamic(&desired)?)
                .await?;
            info!(kind = %kind, name = %name, namespace = %namespace, "Updated");
            Ok(OperationResult::Updated)
        }
    }
}

/// Delete an object only when `owner` is its controller. Objects with
/// the same name created by someone else are left alone.
pub async fn delete_owned<K, C>(client: &C, owner: &AppsodyApplication, name: &str) -> Result<bool>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
{
    let namespace = owner_namespace(owner)?;
    let Some(existing) = get_opt::<K, C>(client, &namespace, name).await? else {
        return Ok(false);
    };
    let kind = K::kind(&());
    if !is_controlled_by(&existing, owner) {
        debug!(kind = %kind, name = %name, namespace = %namespace, "Not owned, keeping");
        return Ok(false);
    }
    let deleted = client
        .delete_object(&ApiResource::erase::<K>(&()), &namespace, name)
        .await?;
    if deleted {
        info!(kind = %kind, name = %name, namespace = %namespace, "Deleted");
    }
    Ok(deleted)
}

/// Drop `owner` from a shared object. The object is deleted once no owner
/// references remain; returns whether it was deleted.
pub async fn release_shared<K, C>(client: &C, owner: &AppsodyApplication, name: &str) -> Result<bool>
where
    K: ManagedObject,
    C: ObjectClient + ?Sized,
{
    let namespace = owner_namespace(owner)?;
    let Some(mut existing) = get_opt::<K, C>(client, &namespace, name).await? else {
        return Ok(false);
    };
    let Some(uid) = owner.meta().uid.clone() else {
        return Ok(false);
    };
    let resource = ApiResource::erase::<K>(&());
    let kind = K::kind(&());

    let references = existing.meta_mut().owner_references.get_or_insert_with(Vec::new);
    let before = references.len();
    references.retain(|r| r.uid != uid);
    if references.len() == before {
        debug!(kind = %kind, name = %name, namespace = %namespace, "Not owned, keeping");
        return Ok(false);
    }

    if references.is_empty() {
        let deleted = client.delete_object(&resource, &namespace, name).await?;
        if deleted {
            info!(kind = %kind, name = %name, namespace = %namespace, "Deleted");
        }
        return Ok(deleted);
    }

    client
        .replace_object(&resource, &namespace, name, &to_dynamic(&existing)?)
        .await?;
    debug!(kind = %kind, name = %name, namespace = %namespace, "Released");
    Ok(false)
}

fn owner_namespace(app: &AppsodyApplication) -> Result<String> {
    app.namespace().ok_or_else(|| {
        OperatorError::InvalidConfig(format!("AppsodyApplication {} has no namespace", app.name_any()))
    })
}

fn owner_reference(owner: &AppsodyApplication, controller: bool) -> Result<OwnerReference> {
    let reference = if controller {
        owner.controller_owner_ref(&())
    } else {
        // kube 0.87 has no `owner_ref`; equivalent to newer kube's `owner_ref` (no controller flag).
        owner
            .controller_owner_ref(&())
            .map(|r| OwnerReference { controller: None, ..r })
    };
    reference.ok_or_else(|| {
        OperatorError::InvalidConfig(format!("AppsodyApplication {} has no uid", owner.name_any()))
    })
}

fn foreign_controller<'a>(references: &'a [OwnerReference], uid: &str) -> Option<&'a OwnerReference> {
    references
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != uid)
}

fn ownership_conflict<K: Resource<DynamicType = ()>>(object: &K, controller: &OwnerReference) -> OperatorError {
    OperatorError::OwnershipConflict {
        kind: K::kind(&()).to_string(),
        name: object.meta().name.clone().unwrap_or_default(),
        controller: format!("{}/{}", controller.kind, controller.name),
    }
}

/// Make `owner` the controlling owner of `object`. An existing reference to
/// `owner` is updated in place; a different controller is an error.
pub fn set_controller_reference<K>(owner: &AppsodyApplication, object: &mut K) -> Result<()>
where
    K: Resource<DynamicType = ()>,
{
    let reference = owner_reference(owner, true)?;
    let references = object.meta().owner_references.clone().unwrap_or_default();
    if let Some(controller) = foreign_controller(&references, &reference.uid) {
        return Err(ownership_conflict(object, controller));
    }
    upsert_reference(object, reference);
    Ok(())
}

/// Record `owner` as a non-controlling owner of `object`
pub fn add_owner_reference<K>(owner: &AppsodyApplication, object: &mut K) -> Result<()>
where
    K: Resource<DynamicType = ()>,
{
    let mut reference = owner_reference(owner, false)?;
    reference.controller = Some(false);
    let references = object.meta().owner_references.clone().unwrap_or_default();
    if let Some(controller) = foreign_controller(&references, &reference.uid) {
        return Err(ownership_conflict(object, controller));
    }
    upsert_reference(object, reference);
    Ok(())
}

fn upsert_reference<K: Resource>(object: &mut K, reference: OwnerReference) {
    let references = object.meta_mut().owner_references.get_or_insert_with(Vec::new);
    match references.iter_mut().find(|r| r.uid == reference.uid) {
        Some(existing) => *existing = reference,
        None => references.push(reference),
    }
}

pub fn is_controlled_by<K: Resource>(object: &K, owner: &AppsodyApplication) -> bool {
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    object
        .meta()
        .owner_references
        .iter()
        .flatten()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}

pub fn reconciled_condition(
    status: ConditionStatus,
    reason: Option<String>,
    message: Option<String>,
    now: DateTime<Utc>,
) -> StatusCondition {
    StatusCondition {
        type_: ConditionType::Reconciled,
        status,
        last_transition_time: Some(Time(now)),
        last_update_time: Some(Time(now)),
        reason,
        message,
    }
}

/// Delay before retrying a failed reconcile: one second after a success (or
/// no previous attempt), otherwise double the time since the previous
/// failure, capped at [`MAX_RETRY_INTERVAL`].
pub fn retry_interval(previous: Option<&StatusCondition>, now: DateTime<Utc>) -> Duration {
    let elapsed = previous
        .filter(|c| c.status == ConditionStatus::False)
        .and_then(|c| c.last_update_time.as_ref())
        .map(|t| (now - t.0).num_milliseconds().max(0) as u64);

    let base = match elapsed {
        Some(ms) => Duration::from_secs(((ms + 500) / 1000).max(1)),
        None => Duration::from_secs(1),
    };
    (base * 2).min(MAX_RETRY_INTERVAL)
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeCluster;
    use super::*;
    use crate::crds::AppsodyApplicationSpec;
    use crate::resources::fixtures::application;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn failed_at(at: DateTime<Utc>) -> StatusCondition {
        reconciled_condition(ConditionStatus::False, Some("x".to_string()), None, at)
    }

    #[test]
    fn test_retry_interval_first_failure() {
        let now = Utc::now();
        assert_eq!(retry_interval(None, now), Duration::from_secs(2));
        let ok = reconciled_condition(ConditionStatus::True, None, None, now);
        assert_eq!(retry_interval(Some(&ok), now), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_interval_doubles() {
        let now = Utc::now();
        let previous = failed_at(now - chrono::Duration::seconds(8));
        assert_eq!(retry_interval(Some(&previous), now), Duration::from_secs(16));

        let immediate = failed_at(now);
        assert_eq!(retry_interval(Some(&immediate), now), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_interval_is_capped() {
        let now = Utc::now();
        let previous = failed_at(now - chrono::Duration::hours(5));
        assert_eq!(retry_interval(Some(&previous), now), MAX_RETRY_INTERVAL);
    }

    fn owned_by(reference: OwnerReference) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("frontend".to_string()),
                namespace: Some("shop".to_string()),
                owner_references: Some(vec![reference]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn replica_set_controller() -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "other".to_string(),
            uid: "uid-2".to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    fn second_consumer() -> AppsodyApplication {
        let mut app = application(AppsodyApplicationSpec::default());
        app.metadata.name = Some("checkout".to_string());
        app.metadata.uid = Some("5d1e9a20".to_string());
        app
    }

    #[test]
    fn test_set_controller_reference_updates_in_place() {
        let owner = application(AppsodyApplicationSpec::default());
        let mut stale = owner.controller_owner_ref(&()).unwrap();
        stale.name = "renamed".to_string();
        let mut deployment = owned_by(OwnerReference {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: "keep".to_string(),
            uid: "uid-3".to_string(),
            ..Default::default()
        });
        deployment.metadata.owner_references.as_mut().unwrap().push(stale);

        set_controller_reference(&owner, &mut deployment).unwrap();
        set_controller_reference(&owner, &mut deployment).unwrap();

        assert!(is_controlled_by(&deployment, &owner));
        assert!(!is_controlled_by(&Deployment::default(), &owner));

        let references = deployment.metadata.owner_references.unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].name, "keep");
        assert_eq!(references[1].name, "frontend");
        assert_eq!(references[1].controller, Some(true));
    }

    #[test]
    fn test_set_controller_reference_rejects_other_controller() {
        let owner = application(AppsodyApplicationSpec::default());
        let mut deployment = owned_by(replica_set_controller());

        let err = set_controller_reference(&owner, &mut deployment).unwrap_err();
        assert!(matches!(
            err,
            OperatorError::OwnershipConflict { ref controller, .. } if controller == "ReplicaSet/other"
        ));
        assert!(err.is_retryable());
        assert_eq!(deployment.metadata.owner_references.unwrap().len(), 1);

        let mut secret = Secret::default();
        secret.metadata.owner_references = Some(vec![replica_set_controller()]);
        assert!(add_owner_reference(&owner, &mut secret).is_err());
    }

    #[tokio::test]
    async fn test_create_or_update_reports_outcome() {
        let cluster = FakeCluster::default();
        let owner = application(AppsodyApplicationSpec::default());
        let label = |value: &'static str| {
            move |deployment: &mut Deployment| {
                deployment.metadata.labels =
                    Some(BTreeMap::from([("tier".to_string(), value.to_string())]));
            }
        };

        let created = create_or_update::<Deployment, _, _>(&cluster, &owner, "frontend", label("web"))
            .await
            .unwrap();
        let unchanged = create_or_update::<Deployment, _, _>(&cluster, &owner, "frontend", label("web"))
            .await
            .unwrap();
        let updated = create_or_update::<Deployment, _, _>(&cluster, &owner, "frontend", label("api"))
            .await
            .unwrap();

        assert_eq!(created, OperationResult::Created);
        assert_eq!(unchanged, OperationResult::Unchanged);
        assert_eq!(updated, OperationResult::Updated);
        let stored: Deployment = cluster.get("shop", "frontend").unwrap();
        assert!(is_controlled_by(&stored, &owner));
        assert_eq!(stored.metadata.labels.unwrap()["tier"], "api");
    }

    #[tokio::test]
    async fn test_foreign_controlled_object_is_not_adopted_or_deleted() {
        let cluster = FakeCluster::default().with_object(owned_by(replica_set_controller()));
        let owner = application(AppsodyApplicationSpec::default());

        let err = create_or_update::<Deployment, _, _>(&cluster, &owner, "frontend", |d| {
            d.metadata.labels = Some(BTreeMap::from([("tier".to_string(), "web".to_string())]))
        })
        .await
        .unwrap_err();
        assert_eq!(err.reason(), "OwnershipConflict");

        assert!(!delete_owned::<Deployment, _>(&cluster, &owner, "frontend").await.unwrap());
        let stored: Deployment = cluster.get("shop", "frontend").unwrap();
        assert!(stored.metadata.labels.is_none());
        assert_eq!(stored.metadata.owner_references.unwrap()[0].kind, "ReplicaSet");
    }

    #[tokio::test]
    async fn test_shared_object_outlives_first_owner() {
        let cluster = FakeCluster::default();
        let frontend = application(AppsodyApplicationSpec::default());
        let checkout = second_consumer();

        for owner in [&frontend, &checkout, &frontend] {
            create_or_update_shared::<Secret, _, _>(&cluster, owner, "billing-invoices", |s| {
                s.type_ = Some("Opaque".to_string())
            })
            .await
            .unwrap();
        }

        let copy: Secret = cluster.get("shop", "billing-invoices").unwrap();
        let references = copy.metadata.owner_references.unwrap();
        assert_eq!(
            references.iter().map(|r| (r.name.as_str(), r.controller)).collect::<Vec<_>>(),
            vec![("frontend", Some(false)), ("checkout", Some(false))]
        );

        assert!(!release_shared::<Secret, _>(&cluster, &frontend, "billing-invoices").await.unwrap());
        let copy: Secret = cluster.get("shop", "billing-invoices").unwrap();
        assert_eq!(copy.metadata.owner_references.unwrap()[0].name, "checkout");

        // Not an owner any more, nothing to release
        assert!(!release_shared::<Secret, _>(&cluster, &frontend, "billing-invoices").await.unwrap());
        assert!(cluster.contains::<Secret>("shop", "billing-invoices"));

        assert!(release_shared::<Secret, _>(&cluster, &checkout, "billing-invoices").await.unwrap());
        assert!(!cluster.contains::<Secret>("shop", "billing-invoices"));
    }
}
