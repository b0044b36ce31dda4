//! Mock seams for functional tests.
//!
//! The pipeline has exactly two external boundaries: the registry credential
//! provider and the notation subprocess. Both are trait objects, so the
//! functional tests replace them with in-memory mocks that record every call.
//! Everything else (hook dispatch, workload parsing, the credential cache,
//! the orchestrator, decision rendering) is production code.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jiff::{SignedDuration, Timestamp};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use notation_admission::config::BypassSet;
use notation_admission::notation::{NotationError, SignatureVerifier, VerifyOutput};
use notation_admission::registry::provider::{
    CredentialProvider, ProviderError, RegistryCredential,
};
use notation_admission::registry::BasicCredentials;
use notation_admission::{
    AdmissionRequest, CredentialCache, Hook, ImageVerifier, WorkloadValidator,
};

/// Credential provider that mints a fixed token and records registries asked
/// for. Set `fail` to simulate a terminal acquisition failure.
pub struct MockProvider {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }
}

#[async_trait]
impl CredentialProvider for MockProvider {
    async fn fetch(&self, registry: &str) -> Result<RegistryCredential, ProviderError> {
        self.calls.lock().await.push(registry.to_string());
        if self.fail {
            return Err(ProviderError::Empty(registry.to_string()));
        }
        Ok(RegistryCredential {
            registry: registry.to_string(),
            authorization_token: STANDARD.encode("AWS:mock-token"),
            expires_at: Timestamp::now() + SignedDuration::from_secs(3600),
        })
    }
}

/// Signature verifier that passes every image except the ones named in
/// `failing`, recording each invocation.
#[derive(Default)]
pub struct MockVerifier {
    pub calls: Mutex<Vec<String>>,
    pub failing: HashSet<String>,
}

impl MockVerifier {
    pub fn failing_on(images: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: images.iter().map(|i| (*i).to_string()).collect(),
        }
    }
}

#[async_trait]
impl SignatureVerifier for MockVerifier {
    async fn verify(
        &self,
        image: &str,
        _credentials: &BasicCredentials,
    ) -> Result<VerifyOutput, NotationError> {
        self.calls.lock().await.push(image.to_string());
        if self.failing.contains(image) {
            return Err(NotationError::Failed {
                subject: image.to_string(),
                stderr: "signature verification failed".to_string(),
            });
        }
        Ok(VerifyOutput::default())
    }
}

/// Assemble a production hook over the given mocks
pub fn build_hook(
    provider: MockProvider,
    verifier: MockVerifier,
    bypass: &[&str],
) -> (Hook, Arc<MockProvider>, Arc<MockVerifier>) {
    let provider = Arc::new(provider);
    let verifier = Arc::new(verifier);
    let cache = Arc::new(CredentialCache::new(provider.clone()));
    let bypass = BypassSet::new(bypass.iter().map(|s| (*s).to_string()));
    let image_verifier = Arc::new(ImageVerifier::new(cache, verifier.clone(), bypass));
    let hook = WorkloadValidator::new(image_verifier).into_hook();
    (hook, provider, verifier)
}

/// Admission request wrapping the given workload document
pub fn admission_request(operation: &str, object: Value) -> AdmissionRequest {
    AdmissionRequest {
        uid: "705ab4f5-6393-11e8-b7cc-42010a800002".to_string(),
        operation: operation.to_string(),
        object,
    }
}

/// Pod document with the given container images
pub fn pod_document(name: &str, namespace: &str, images: &[&str]) -> Value {
    let containers: Vec<Value> = images
        .iter()
        .enumerate()
        .map(|(i, image)| json!({"name": format!("c{i}"), "image": image}))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"containers": containers}
    })
}

/// Deployment document with the given primary and init container images
pub fn deployment_document(
    name: &str,
    namespace: &str,
    images: &[&str],
    init_images: &[&str],
) -> Value {
    let containers: Vec<Value> = images
        .iter()
        .enumerate()
        .map(|(i, image)| json!({"name": format!("c{i}"), "image": image}))
        .collect();
    let init_containers: Vec<Value> = init_images
        .iter()
        .enumerate()
        .map(|(i, image)| json!({"name": format!("init{i}"), "image": image}))
        .collect();
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "selector": {"matchLabels": {"app": name}},
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {
                    "containers": containers,
                    "initContainers": init_containers
                }
            }
        }
    })
}
