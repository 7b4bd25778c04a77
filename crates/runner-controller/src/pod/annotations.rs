//! # Progress annotations
//!
//! The graceful stop records its progress as timestamps on the runner pod.
//! Annotations are only ever added: the pod passed in is treated as a snapshot,
//! the new key goes onto a copy, and the difference between the two is sent as
//! a JSON merge patch guarded by the snapshot's `resourceVersion`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Set once the controller has begun unregistering the runner
pub const UNREGISTRATION_START_TIMESTAMP: &str = "unregistration-start-timestamp";

/// Set once the runner pod has been found safe to delete
pub const UNREGISTRATION_COMPLETE_TIMESTAMP: &str = "unregistration-complete-timestamp";

/// Submits annotation changes of a pod
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodPatcher: Send + Sync {
    /// Persist the difference between `original` and `updated`.
    ///
    /// Must fail rather than overwrite when the stored pod no longer matches
    /// `original`. Returns the pod as stored after the patch.
    async fn patch_pod(&self, original: &Pod, updated: &Pod) -> Result<Pod>;
}

/// [`PodPatcher`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubePodPatcher {
    client: Client,
}

impl KubePodPatcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodPatcher for KubePodPatcher {
    async fn patch_pod(&self, original: &Pod, updated: &Pod) -> Result<Pod> {
        let name = original.name_any();
        let namespace = original
            .namespace()
            .unwrap_or_else(|| self.client.default_namespace().to_string());
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        let patch = conditional_merge_patch(original, updated)?;
        debug!(pod = %name, patch = %patch, "Patching runner pod");

        match pods
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(pod) => Ok(pod),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                Err(Error::PatchConflict { pod: name })
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }
}

/// Look up an annotation on the pod
#[must_use]
pub fn get_annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Outcome of [`set_annotation_if_absent`]
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationWrite {
    /// The key was already set; the pod is returned as given
    Present(Pod),
    /// The key has just been written; the pod is as stored after the patch
    Written(Pod),
}

impl AnnotationWrite {
    #[must_use]
    pub fn into_pod(self) -> Pod {
        match self {
            Self::Present(pod) | Self::Written(pod) => pod,
        }
    }
}

/// Add an annotation unless the pod already carries the key.
///
/// No API call is made when the key is present. A failed patch is returned as
/// is and nothing is assumed written.
pub async fn set_annotation_if_absent(
    patcher: &dyn PodPatcher,
    pod: &Pod,
    key: &str,
    value: &str,
) -> Result<AnnotationWrite> {
    if get_annotation(pod, key).is_some() {
        return Ok(AnnotationWrite::Present(pod.clone()));
    }

    let mut updated = pod.clone();
    updated
        .annotations_mut()
        .insert(key.to_string(), value.to_string());

    patcher
        .patch_pod(pod, &updated)
        .await
        .map(AnnotationWrite::Written)
}

/// Merge patch from `original` to `updated`, preconditioned on the original
/// `resourceVersion`.
pub fn conditional_merge_patch(original: &Pod, updated: &Pod) -> Result<Value> {
    let mut patch = merge_patch(&serde_json::to_value(original)?, &serde_json::to_value(updated)?);

    if let Some(resource_version) = original.metadata.resource_version.as_deref() {
        patch["metadata"]["resourceVersion"] = Value::String(resource_version.to_string());
    }

    Ok(patch)
}

/// RFC 7386 merge patch turning `original` into `updated`
#[must_use]
pub fn merge_patch(original: &Value, updated: &Value) -> Value {
    match (original, updated) {
        (Value::Object(original), Value::Object(updated)) => {
            let mut patch = Map::new();

            for key in original.keys() {
                if !updated.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }

            for (key, value) in updated {
                match original.get(key) {
                    Some(previous) if previous == value => {}
                    Some(previous) => {
                        patch.insert(key.clone(), merge_patch(previous, value));
                    }
                    None => {
                        patch.insert(key.clone(), value.clone());
                    }
                }
            }

            Value::Object(patch)
        }
        _ => updated.clone(),
    }
}
