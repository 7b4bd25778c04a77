//! Runner pod patches against a mock Kubernetes API server

use k8s_openapi::api::core::v1::Pod;
use kube::core::ObjectMeta;
use runner_controller::pod::{get_annotation, UNREGISTRATION_START_TIMESTAMP};
use runner_controller::{Error, KubePodPatcher, PodPatcher};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STARTED: &str = "2025-06-01T12:00:00Z";

fn patcher(server: &MockServer) -> KubePodPatcher {
    let config = kube::Config::new(server.uri().parse().unwrap());
    KubePodPatcher::new(kube::Client::try_from(config).unwrap())
}

fn runner_pod(namespace: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("w1".to_string()),
            namespace: namespace.map(str::to_string),
            resource_version: Some("4242".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn with_start_marker(pod: &Pod) -> Pod {
    let mut updated = pod.clone();
    updated.metadata.annotations = Some(
        [(UNREGISTRATION_START_TIMESTAMP.to_string(), STARTED.to_string())]
            .into_iter()
            .collect(),
    );
    updated
}

fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    }))
}

#[tokio::test]
async fn test_patch_sends_conditional_merge_patch() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/actions/pods/w1"))
        .and(header("content-type", "application/merge-patch+json"))
        .and(body_partial_json(json!({
            "metadata": {
                "resourceVersion": "4242",
                "annotations": {UNREGISTRATION_START_TIMESTAMP: STARTED}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "w1",
                "namespace": "actions",
                "resourceVersion": "4243",
                "annotations": {UNREGISTRATION_START_TIMESTAMP: STARTED}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let original = runner_pod(Some("actions"));
    let stored = patcher(&server)
        .patch_pod(&original, &with_start_marker(&original))
        .await
        .unwrap();

    assert_eq!(stored.metadata.resource_version.as_deref(), Some("4243"));
    assert_eq!(
        get_annotation(&stored, UNREGISTRATION_START_TIMESTAMP),
        Some(STARTED)
    );
}

#[tokio::test]
async fn test_conflict_is_patch_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/actions/pods/w1"))
        .respond_with(status(
            409,
            "Conflict",
            "Operation cannot be fulfilled on pods \"w1\": the object has been modified",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let original = runner_pod(Some("actions"));
    let err = patcher(&server)
        .patch_pod(&original, &with_start_marker(&original))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PatchConflict { ref pod } if pod == "w1"));
}

#[tokio::test]
async fn test_other_api_failures_stay_kube_errors() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/actions/pods/w1"))
        .respond_with(status(500, "InternalError", "etcdserver: request timed out"))
        .mount(&server)
        .await;

    let original = runner_pod(Some("actions"));
    let err = patcher(&server)
        .patch_pod(&original, &with_start_marker(&original))
        .await
        .unwrap_err();

    match err {
        Error::Kube(kube::Error::Api(response)) => assert_eq!(response.code, 500),
        other => panic!("expected kube API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pod_without_namespace_uses_client_default() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/default/pods/w1"))
        .respond_with(status(409, "Conflict", "the object has been modified"))
        .expect(1)
        .mount(&server)
        .await;

    let original = runner_pod(None);
    let err = patcher(&server)
        .patch_pod(&original, &with_start_marker(&original))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PatchConflict { .. }));
}
