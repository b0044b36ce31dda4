//! Admission webhook server.
//!
//! One POST endpoint accepting an AdmissionReview document over TLS. The
//! `Json` extractor already answers non-POST methods and non-JSON content
//! types with a 4xx before the pipeline runs. The response echoes the
//! review kind, apiVersion, and request UID.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::admission::{AdmissionRequest, AdmissionResult, Hook};
use crate::health::HealthState;

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
pub const ADMISSION_REVIEW_VERSION: &str = "admission.k8s.io/v1";

/// Shared state for the webhook handler
pub struct WebhookState {
    pub hook: Hook,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(hook: Hook, health: Arc<HealthState>) -> Self {
        Self { hook, health }
    }
}

/// Inbound AdmissionReview envelope.
///
/// The operation stays a raw string so values outside the known set reach
/// the dispatcher and come back as an explicit deny instead of a decode
/// failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEnvelope {
    #[serde(default)]
    pub request: Option<WireRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub uid: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub object: serde_json::Value,
}

/// Outbound AdmissionReview envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub response: WireResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub uid: String,
    pub allowed: bool,
    pub status: WireStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WireStatus {
    pub message: String,
}

/// Wrap an admission decision in the caller's expected envelope
fn review_response(uid: &str, result: &AdmissionResult) -> ReviewResponse {
    ReviewResponse {
        kind: ADMISSION_REVIEW_KIND,
        api_version: ADMISSION_REVIEW_VERSION,
        response: WireResponse {
            uid: uid.to_string(),
            allowed: result.allowed,
            status: WireStatus {
                message: result.message.clone(),
            },
            warnings: result.warnings.clone(),
        },
    }
}

/// Validation endpoint handler
async fn validate(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<ReviewEnvelope>,
) -> Response {
    let Some(wire) = review.request else {
        return (
            StatusCode::BAD_REQUEST,
            "malformed admission review: request is empty",
        )
            .into_response();
    };

    let request = AdmissionRequest {
        uid: wire.uid,
        operation: wire.operation,
        object: wire.object,
    };

    debug!(
        uid = %request.uid,
        operation = %request.operation,
        "processing admission request"
    );

    match state.hook.execute(&request).await {
        Ok(result) => {
            info!(
                uid = %request.uid,
                operation = %request.operation,
                allowed = result.allowed,
                message = %result.message,
                "admission reviewed"
            );
            state.health.metrics.record_admission(result.allowed);
            (StatusCode::OK, Json(review_response(&request.uid, &result))).into_response()
        }
        Err(e) => {
            // A missing handler is a configuration gap; surface it as a
            // server error rather than an implicit allow or deny
            error!(uid = %request.uid, error = %e, "admission handling failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router(path: &str, state: Arc<WebhookState>) -> Router {
    Router::new().route(path, post(validate)).with_state(state)
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS.
///
/// Binds to 0.0.0.0 on the given port and serves the validation endpoint.
/// Certificates are loaded from the given PEM files.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    path: &str,
    port: u16,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let app = create_webhook_router(path, state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, path, "webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
