//! Workload validation handler.
//!
//! The Create/Update handler: extract the workload's images, run them
//! through the image verifier, and render an allow/deny decision. Every
//! failure path denies with a message; internal credential errors are
//! collapsed to a generic message so provider detail never reaches the
//! cluster caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::workload;
use super::{AdmissionRequest, AdmissionResult, AdmitHandler, Hook, HookError};
use crate::notation::VALIDATION_FAILED;
use crate::verifier::ImageVerifier;

/// Validates workload image signatures on Create and Update
pub struct WorkloadValidator {
    verifier: Arc<ImageVerifier>,
}

impl WorkloadValidator {
    pub fn new(verifier: Arc<ImageVerifier>) -> Self {
        Self { verifier }
    }

    /// Build a hook with this validator registered for Create and Update
    pub fn into_hook(self) -> Hook {
        let handler: Arc<dyn AdmitHandler> = Arc::new(self);
        Hook::new()
            .on_create(handler.clone())
            .on_update(handler)
    }
}

#[async_trait]
impl AdmitHandler for WorkloadValidator {
    async fn admit(&self, request: &AdmissionRequest) -> Result<AdmissionResult, HookError> {
        let workload = match workload::parse_value(&request.object) {
            Ok(workload) => workload,
            Err(e) => {
                error!(uid = %request.uid, error = %e, "could not parse workload");
                return Ok(AdmissionResult::denied(e.to_string()));
            }
        };

        debug!(
            uid = %request.uid,
            kind = %workload.kind,
            name = %workload.name,
            namespace = %workload.namespace,
            images = ?workload.images,
            "verifying workload images"
        );

        let verification = self.verifier.verify_subjects(&workload.images).await;

        if let Some(error) = &verification.error {
            error!(uid = %request.uid, error = %error, "verification error");
            return Ok(AdmissionResult::denied(VALIDATION_FAILED));
        }

        let mut verified = Vec::new();
        let mut warnings = Vec::new();
        for response in &verification.responses {
            if response.error.is_some() {
                return Ok(AdmissionResult::denied(format!(
                    "{} image, in {} {}, in {} namespace, failed signature validation",
                    response.image, workload.name, workload.kind, workload.namespace
                )));
            }
            if let Some(warning) = &response.warning {
                warnings.push(warning.clone());
            }
            verified.push(response.image.clone());
        }

        let message = format!(
            "{} {} in {} namespace, images verified: {:?}",
            workload.name, workload.kind, workload.namespace, verified
        );
        info!(uid = %request.uid, message = %message, "workload admitted");

        Ok(AdmissionResult {
            allowed: true,
            message,
            warnings,
        })
    }
}
