//! Image verification orchestration.
//!
//! Sequences the bypass set, the credential cache, and the signature
//! verifier across a workload's image list. Verification stops at the first
//! failing image: the batch is already denied at that point, so remaining
//! invocations would only add latency to a deny.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::BypassSet;
use crate::notation::{NotationError, SignatureVerifier};
use crate::registry::{self, CredentialCache, CredentialError};

/// Warning suffix attached to bypassed images
pub const MSG_VERIFY_BYPASS: &str = "image verification bypassed";

/// Outcome for a single image
#[derive(Debug, Default)]
pub struct VerifyResponse {
    pub image: String,
    pub bypassed: bool,
    pub error: Option<NotationError>,
    pub warning: Option<String>,
}

/// Aggregate outcome for one workload's image list.
///
/// `error` is set only when credential acquisition or decoding itself
/// failed; per-image verification failures live on the responses.
#[derive(Debug, Default)]
pub struct Verification {
    pub responses: Vec<VerifyResponse>,
    pub message: Option<String>,
    pub error: Option<CredentialError>,
}

impl Verification {
    /// Whether any outcome in this verification denies the request
    pub fn denied(&self) -> bool {
        self.error.is_some() || self.responses.iter().any(|r| r.error.is_some())
    }

    fn terminal(mut self, error: CredentialError) -> Self {
        self.message = Some(error.to_string());
        self.error = Some(error);
        self
    }
}

/// Verifies a list of image references against the trust policy
pub struct ImageVerifier {
    cache: Arc<CredentialCache>,
    verifier: Arc<dyn SignatureVerifier>,
    bypass: BypassSet,
}

impl ImageVerifier {
    pub fn new(
        cache: Arc<CredentialCache>,
        verifier: Arc<dyn SignatureVerifier>,
        bypass: BypassSet,
    ) -> Self {
        Self {
            cache,
            verifier,
            bypass,
        }
    }

    /// Verify each image in order, stopping at the first failure.
    ///
    /// Bypassed registries record a warning and never reach the cache or the
    /// verifier. A credential failure is terminal for the whole batch.
    pub async fn verify_subjects(&self, images: &[String]) -> Verification {
        let mut verification = Verification::default();

        for image in images {
            let registry = registry::registry_from_image(image);

            if self.bypass.contains(&registry) {
                info!(image = %image, registry = %registry, "image verification bypassed");
                verification.responses.push(VerifyResponse {
                    image: image.clone(),
                    bypassed: true,
                    warning: Some(format!("{} - {}", image, MSG_VERIFY_BYPASS)),
                    error: None,
                });
                continue;
            }

            let credential = match self.cache.get(&registry).await {
                Ok(credential) => credential,
                Err(e) => {
                    error!(registry = %registry, error = %e, "could not get registry credential");
                    return verification.terminal(e);
                }
            };

            let credentials = match credential.basic_auth() {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!(registry = %registry, error = %e, "could not decode registry credential");
                    return verification.terminal(e.into());
                }
            };

            match self.verifier.verify(image, &credentials).await {
                Ok(output) => {
                    debug!(image = %image, stdout = %output.stdout, "image verified");
                    verification.responses.push(VerifyResponse {
                        image: image.clone(),
                        ..VerifyResponse::default()
                    });
                }
                Err(e) => {
                    debug!(image = %image, error = %e, "image verification failed");
                    verification.responses.push(VerifyResponse {
                        image: image.clone(),
                        error: Some(e),
                        ..VerifyResponse::default()
                    });
                    return verification;
                }
            }
        }

        verification
    }
}
