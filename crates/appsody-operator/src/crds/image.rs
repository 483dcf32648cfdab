//! OpenShift `image.openshift.io/v1` ImageStream (read only)

use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "image.openshift.io/v1";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    plural = "imagestreams",
    derive = "Default",
    schema = "disabled",
    namespaced
)]
#[kube(status = "ImageStreamStatus")]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<ImageLookupPolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageLookupPolicy {
    #[serde(default)]
    pub local: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,

    #[serde(default)]
    pub tags: Vec<NamedTagEventList>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamedTagEventList {
    pub tag: String,

    #[serde(default)]
    pub items: Vec<TagEvent>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    pub docker_image_reference: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// An `[namespace/]name[:tag]` reference to an ImageStream tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageStreamRef {
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl ImageStreamRef {
    /// Parse an application image as an ImageStream reference. Images that
    /// carry a registry host or a digest are never ImageStream references.
    pub fn parse(image: &str, default_namespace: &str) -> Option<Self> {
        if image.is_empty() || image.contains('@') {
            return None;
        }
        let (path, tag) = match image.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path, tag),
            _ => (image, "latest"),
        };
        let segments: Vec<&str> = path.split('/').collect();
        let (namespace, name) = match segments.as_slice() {
            [name] => (default_namespace, *name),
            [namespace, name] if !namespace.contains('.') && !namespace.contains(':') => {
                (*namespace, *name)
            }
            _ => return None,
        };
        if name.is_empty() || namespace.is_empty() || tag.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl ImageStream {
    /// Latest image pushed to the given tag
    pub fn latest_reference(&self, tag: &str) -> Option<String> {
        self.status
            .as_ref()?
            .tags
            .iter()
            .find(|t| t.tag == tag)?
            .items
            .first()
            .map(|item| item.docker_image_reference.clone())
    }
}
