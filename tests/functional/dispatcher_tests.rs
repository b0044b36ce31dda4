//! Hook dispatcher tests.
//!
//! The validator registers itself for Create and Update only. These tests
//! pin down how the other operations and wire garbage are answered.

use notation_admission::{HookError, Operation};
use serde_json::json;

use crate::mocks::{admission_request, build_hook, pod_document, MockProvider, MockVerifier};

#[tokio::test]
async fn test_create_and_update_are_both_registered() {
    let (hook, _provider, _verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let pod = pod_document("web", "default", &["repo.example.com/web:1.0"]);

    for operation in ["CREATE", "UPDATE"] {
        let result = hook
            .execute(&admission_request(operation, pod.clone()))
            .await
            .unwrap();
        assert!(result.allowed, "{operation} should route to the validator");
    }
}

#[tokio::test]
async fn test_operation_matching_is_case_insensitive() {
    let (hook, _provider, _verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let pod = pod_document("web", "default", &["repo.example.com/web:1.0"]);

    let result = hook
        .execute(&admission_request("create", pod))
        .await
        .unwrap();
    assert!(result.allowed);
}

#[tokio::test]
async fn test_unknown_operation_is_denied_not_errored() {
    let (hook, provider, verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);
    let pod = pod_document("web", "default", &["repo.example.com/web:1.0"]);

    let result = hook
        .execute(&admission_request("BOGUS", pod))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert_eq!(result.message, "invalid operation: BOGUS");
    assert!(provider.calls.lock().await.is_empty());
    assert!(verifier.calls.lock().await.is_empty());
}

#[tokio::test]
async fn test_unregistered_operation_is_a_hook_error() {
    let (hook, _provider, _verifier) =
        build_hook(MockProvider::default(), MockVerifier::default(), &[]);

    let result = hook
        .execute(&admission_request("DELETE", json!({"kind": "Pod"})))
        .await;
    assert!(matches!(
        result,
        Err(HookError::NotRegistered(Operation::Delete))
    ));

    let result = hook
        .execute(&admission_request("CONNECT", json!({"kind": "Pod"})))
        .await;
    assert!(matches!(
        result,
        Err(HookError::NotRegistered(Operation::Connect))
    ));
}
