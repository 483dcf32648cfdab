use super::apply_metadata;
use crate::crds::AppsodyApplication;
use k8s_openapi::api::core::v1::{LocalObjectReference, ServiceAccount};

/// Service account created when the application does not name its own.
/// Pull secrets added by the platform are kept.
pub fn apply_service_account(account: &mut ServiceAccount, app: &AppsodyApplication) {
    apply_metadata(&mut account.metadata, app);

    if let Some(secret) = app.spec.pull_secret.as_ref().filter(|s| !s.is_empty()) {
        let secrets = account.image_pull_secrets.get_or_insert_with(Vec::new);
        if !secrets.iter().any(|r| r.name.as_deref() == Some(secret.as_str())) {
            secrets.push(LocalObjectReference {
                name: Some(secret.clone()),
            });
        }
    }
}
