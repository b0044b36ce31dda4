//! End-to-end admission pipeline tests.
//!
//! Each test pushes a complete workload document through hook dispatch,
//! workload extraction, credential acquisition, and mock signature
//! verification, then asserts on the rendered decision.

use crate::mocks::{
    admission_request, build_hook, deployment_document, pod_document, MockProvider, MockVerifier,
};

#[tokio::test]
async fn test_pod_with_valid_signatures_allows() {
    let (hook, provider, verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let pod = pod_document(
        "web",
        "prod",
        &["repo.example.com/web:1.0", "repo.example.com/sidecar:2.0"],
    );

    let result = hook
        .execute(&admission_request("CREATE", pod))
        .await
        .unwrap();

    assert!(result.allowed);
    assert_eq!(
        result.message,
        "web Pod in prod namespace, images verified: [\"repo.example.com/web:1.0\", \"repo.example.com/sidecar:2.0\"]"
    );
    assert!(result.warnings.is_empty());
    assert_eq!(verifier.calls.lock().await.len(), 2);
    // Both images share one registry, so one credential acquisition
    assert_eq!(*provider.calls.lock().await, vec!["repo.example.com"]);
}

#[tokio::test]
async fn test_deployment_with_bypassed_registry_allows_with_warnings() {
    let (hook, provider, verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &["quay.io"]);
    // Duplicate image in primary and init containers, both bypassed
    let deployment = deployment_document(
        "ingest",
        "pipelines",
        &["quay.io/org/ingest:4"],
        &["quay.io/org/ingest:4"],
    );

    let result = hook
        .execute(&admission_request("UPDATE", deployment))
        .await
        .unwrap();

    assert!(result.allowed);
    assert_eq!(
        result.warnings,
        vec![
            "quay.io/org/ingest:4 - image verification bypassed",
            "quay.io/org/ingest:4 - image verification bypassed"
        ]
    );
    // Bypassed images never reach the cache or the verifier
    assert!(provider.calls.lock().await.is_empty());
    assert!(verifier.calls.lock().await.is_empty());
}

#[tokio::test]
async fn test_unsigned_image_denies_with_workload_identity() {
    let (hook, _provider, verifier) = build_hook(
        MockProvider::default(),
        MockVerifier::failing_on(&["repo.example.com/evil:1"]),
        &[],
    );
    let pod = pod_document(
        "runner",
        "ci",
        &[
            "repo.example.com/good:1",
            "repo.example.com/evil:1",
            "repo.example.com/never:1",
        ],
    );

    let result = hook
        .execute(&admission_request("CREATE", pod))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert_eq!(
        result.message,
        "repo.example.com/evil:1 image, in runner Pod, in ci namespace, failed signature validation"
    );
    // Short-circuit: the image after the failing one is never attempted
    assert_eq!(
        *verifier.calls.lock().await,
        vec!["repo.example.com/good:1", "repo.example.com/evil:1"]
    );
}

#[tokio::test]
async fn test_credential_failure_denies_with_generic_message() {
    let provider = MockProvider {
        fail: true,
        ..MockProvider::default()
    };
    let (hook, _provider, verifier) = build_hook(provider, MockVerifier::default(), &[]);
    let pod = pod_document("web", "prod", &["repo.example.com/web:1.0"]);

    let result = hook
        .execute(&admission_request("CREATE", pod))
        .await
        .unwrap();

    assert!(!result.allowed);
    // Provider detail must not leak to the cluster caller
    assert_eq!(result.message, "notation validation failed");
    assert!(verifier.calls.lock().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_kind_denies() {
    let (hook, _provider, _verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let doc = serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings", "namespace": "default"},
        "data": {}
    });

    let result = hook
        .execute(&admission_request("CREATE", doc))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert_eq!(
        result.message,
        "kind ConfigMap not supported by validation controller"
    );
}

#[tokio::test]
async fn test_malformed_document_denies() {
    let (hook, _provider, _verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let doc = serde_json::json!({
        "kind": "Pod",
        "metadata": {"name": "bad", "namespace": "default"},
        "spec": {"containers": "not-an-array"}
    });

    let result = hook
        .execute(&admission_request("CREATE", doc))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert!(result.message.starts_with("could not parse workload document"));
}

#[tokio::test]
async fn test_pod_without_images_allows() {
    let (hook, provider, verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let doc = serde_json::json!({
        "kind": "Pod",
        "metadata": {"name": "empty", "namespace": "default"}
    });

    let result = hook
        .execute(&admission_request("CREATE", doc))
        .await
        .unwrap();

    assert!(result.allowed);
    assert_eq!(
        result.message,
        "empty Pod in default namespace, images verified: []"
    );
    assert!(provider.calls.lock().await.is_empty());
    assert!(verifier.calls.lock().await.is_empty());
}

#[tokio::test]
async fn test_mixed_bypassed_and_verified_images() {
    let (hook, _provider, verifier) = build_hook(
        MockProvider::default(),
        MockVerifier::default(),
        &["quay.io"],
    );
    let pod = pod_document(
        "mixed",
        "default",
        &["quay.io/org/helper:1", "repo.example.com/app:1.0"],
    );

    let result = hook
        .execute(&admission_request("CREATE", pod))
        .await
        .unwrap();

    assert!(result.allowed);
    assert_eq!(
        result.warnings,
        vec!["quay.io/org/helper:1 - image verification bypassed"]
    );
    // Only the non-bypassed image reached the verifier
    assert_eq!(*verifier.calls.lock().await, vec!["repo.example.com/app:1.0"]);
}
