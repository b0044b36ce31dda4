//! Adapter around the notation signature verifier.
//!
//! The verifier is an external binary with bounded execution time; this
//! module owns argument assembly, environment propagation, output capture,
//! and the startup-time operations (version self-check, trust-store
//! bootstrap). Verification itself stays behind the [`SignatureVerifier`]
//! trait so the orchestrator can be tested against a fake.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::NotationConfig;
use crate::registry::BasicCredentials;

/// Generic message surfaced to the cluster when verification machinery fails
pub const VALIDATION_FAILED: &str = "notation validation failed";

/// Errors raised by verifier invocations
#[derive(Error, Debug)]
pub enum NotationError {
    /// Binary could not be spawned
    #[error("could not invoke notation: {0}")]
    Spawn(#[from] std::io::Error),

    /// Binary exited non-zero
    #[error("notation failed for {subject}: {stderr}")]
    Failed { subject: String, stderr: String },

    /// Invocation exceeded its time bound
    #[error("notation invocation for {0} timed out")]
    Timeout(String),
}

/// Captured output of a verifier invocation
#[derive(Debug, Clone, Default)]
pub struct VerifyOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Capability that verifies one image signature with registry credentials
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(
        &self,
        image: &str,
        credentials: &BasicCredentials,
    ) -> Result<VerifyOutput, NotationError>;
}

/// Drives the notation binary as a subprocess
pub struct NotationCommand {
    config: NotationConfig,
    timeout: Duration,
}

impl NotationCommand {
    pub fn new(config: NotationConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Self { config, timeout }
    }

    /// Assemble the argument list for a verify invocation
    fn verify_args(&self, image: &str, credentials: &BasicCredentials) -> Vec<String> {
        let mut args = vec![
            self.config.cmd_verify.clone(),
            "-u".to_string(),
            credentials.username.clone(),
            "-p".to_string(),
            credentials.password.clone(),
            image.to_string(),
        ];

        if self.config.debug_enabled {
            args.push(self.config.debug_flag.clone());
        }

        if !self.config.signer_endpoint.is_empty() {
            args.push("--plugin-config".to_string());
            args.push(format!(
                "signer-endpoint-url={}",
                self.config.signer_endpoint
            ));
        }

        if self.config.signer_debug {
            args.push("--plugin-config".to_string());
            args.push("debug=true".to_string());
        }

        args
    }

    /// Run the binary with the config home exported.
    ///
    /// The binary resolves its trust policy and trust store relative to the
    /// exported config home; every invocation must carry it.
    async fn run(&self, subject: &str, args: &[String]) -> Result<VerifyOutput, NotationError> {
        debug!(subject, binary = %self.config.binary_path, "invoking notation");

        let invocation = Command::new(&self.config.binary_path)
            .args(args)
            .env(&self.config.xdg_home_var, &self.config.xdg_home_val)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, invocation)
            .await
            .map_err(|_| NotationError::Timeout(subject.to_string()))??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(NotationError::Failed {
                subject: subject.to_string(),
                stderr,
            });
        }

        Ok(VerifyOutput { stdout, stderr })
    }

    /// Report the binary version; used as a startup self-check
    pub async fn version(&self) -> Result<String, NotationError> {
        let args = vec![self.config.cmd_version.clone()];
        let output = self.run("version", &args).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Register the root certificate with the configured trust store
    pub async fn add_trust_store_cert(&self) -> Result<VerifyOutput, NotationError> {
        let args = vec![
            "certificate".to_string(),
            "add".to_string(),
            "--type".to_string(),
            "signingAuthority".to_string(),
            "--store".to_string(),
            self.config.trust_store.clone(),
            self.config.root_cert.clone(),
        ];
        self.run(&self.config.root_cert, &args).await
    }
}

#[async_trait]
impl SignatureVerifier for NotationCommand {
    async fn verify(
        &self,
        image: &str,
        credentials: &BasicCredentials,
    ) -> Result<VerifyOutput, NotationError> {
        let args = self.verify_args(image, credentials);
        self.run(image, &args).await
    }
}
