//! Credential provider seam and the ECR token provider.
//!
//! The cache depends on a [`CredentialProvider`] capability so tests can
//! substitute a fake and the production token exchange stays swappable. The
//! shipped implementation drives the AWS CLI as a subprocess under the pod's
//! IRSA identity; the SDK-level token exchange is deliberately outside this
//! crate's core.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jiff::Timestamp;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::AwsEnv;

/// Session name advertised on web-identity token exchanges
pub const SESSION_NAME: &str = "IRSA_CREDS_SESSION";

/// Errors raised while acquiring a registry credential
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Credential helper could not be spawned
    #[error("could not invoke credential helper: {0}")]
    Spawn(#[from] std::io::Error),

    /// Credential helper exited non-zero
    #[error("credential helper failed for {registry}: {stderr}")]
    Helper { registry: String, stderr: String },

    /// Credential helper output was not the expected JSON shape
    #[error("could not parse credential helper output: {0}")]
    Output(#[from] serde_json::Error),

    /// Credential helper returned no authorization data
    #[error("credential helper returned no authorization data for {0}")]
    Empty(String),

    /// Expiry timestamp was not parseable
    #[error("could not parse credential expiry: {0}")]
    Expiry(#[from] jiff::Error),

    /// Acquisition exceeded its time bound
    #[error("credential acquisition for {0} timed out")]
    Timeout(String),
}

/// Raised when a stored authorization token cannot be decoded
#[derive(Error, Debug)]
#[error("could not decode registry auth token: {0}")]
pub struct MalformedCredential(pub String);

/// Decoded username/password pair for registry basic auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// A time-bounded authorization credential for one registry host
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    pub registry: String,
    /// Base64-encoded `username:password` payload
    pub authorization_token: String,
    pub expires_at: Timestamp,
}

impl RegistryCredential {
    /// Decode the authorization token into basic-auth credentials.
    ///
    /// Pure transform; the cache entry itself is never mutated.
    pub fn basic_auth(&self) -> Result<BasicCredentials, MalformedCredential> {
        let decoded = STANDARD
            .decode(&self.authorization_token)
            .map_err(|e| MalformedCredential(e.to_string()))?;
        let decoded = String::from_utf8(decoded).map_err(|e| MalformedCredential(e.to_string()))?;

        match decoded.split_once(':') {
            Some((username, password)) => Ok(BasicCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            None => Err(MalformedCredential(
                "token payload is not a username:password pair".to_string(),
            )),
        }
    }

    /// Whether this credential expires within the lookahead window
    pub fn expires_within(&self, lookahead: Duration, now: Timestamp) -> bool {
        let secs = i64::try_from(lookahead.as_secs()).unwrap_or(i64::MAX);
        let horizon = now
            .saturating_add(jiff::SignedDuration::from_secs(secs))
            .unwrap_or(Timestamp::MAX);
        self.expires_at <= horizon
    }
}

/// Capability that performs the actual token exchange for one registry
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self, registry: &str) -> Result<RegistryCredential, ProviderError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokenOutput {
    #[serde(default)]
    authorization_data: Vec<AuthData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    authorization_token: String,
    expires_at: String,
}

/// Parse the `get-authorization-token` JSON output into a credential
fn parse_auth_output(registry: &str, bytes: &[u8]) -> Result<RegistryCredential, ProviderError> {
    let output: AuthTokenOutput = serde_json::from_slice(bytes)?;
    let auth = output
        .authorization_data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Empty(registry.to_string()))?;
    let expires_at: Timestamp = auth.expires_at.parse()?;

    Ok(RegistryCredential {
        registry: registry.to_string(),
        authorization_token: auth.authorization_token,
        expires_at,
    })
}

/// Fetches ECR authorization tokens via the AWS CLI under IRSA
pub struct EcrTokenProvider {
    env: AwsEnv,
    timeout: Duration,
}

impl EcrTokenProvider {
    pub fn new(env: AwsEnv, timeout: Duration) -> Self {
        Self { env, timeout }
    }
}

#[async_trait]
impl CredentialProvider for EcrTokenProvider {
    async fn fetch(&self, registry: &str) -> Result<RegistryCredential, ProviderError> {
        // Cross-region registries authenticate against their own region
        let region =
            super::region_from_registry(registry).unwrap_or_else(|| self.env.region.clone());

        debug!(registry, region = %region, "acquiring ECR authorization token");

        let invocation = Command::new("aws")
            .args([
                "ecr",
                "get-authorization-token",
                "--region",
                &region,
                "--output",
                "json",
            ])
            .env("AWS_REGION", &self.env.region)
            .env("AWS_ROLE_ARN", &self.env.role_arn)
            .env("AWS_WEB_IDENTITY_TOKEN_FILE", &self.env.token_file)
            .env("AWS_ROLE_SESSION_NAME", SESSION_NAME)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, invocation)
            .await
            .map_err(|_| ProviderError::Timeout(registry.to_string()))??;

        if !output.status.success() {
            return Err(ProviderError::Helper {
                registry: registry.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_auth_output(registry, &output.stdout)
    }
}
