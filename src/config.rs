//! Server configuration and trust policy documents.
//!
//! The operator supplies two documents: a YAML server configuration and a
//! JSON notation trust policy. Both are read once at startup and treated as
//! immutable afterwards. Cloud identity (IRSA) is discovered from the
//! environment separately since it is injected by the service account
//! webhook, not by the operator.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern for the registry implied by the controller's own AWS identity.
pub const ECR_PATTERN: &str = "<ACCOUNT>.dkr.ecr.<REGION>.amazonaws.com";

/// Errors raised while loading configuration inputs
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Server configuration is not valid YAML
    #[error("could not parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Trust policy is not valid JSON
    #[error("could not parse trust policy: {0}")]
    Json(#[from] serde_json::Error),

    /// IRSA environment variables are incomplete
    #[error(
        "required environment variables not set, AWS_REGION: {region}, \
         AWS_ROLE_ARN: {role_arn}, AWS_WEB_IDENTITY_TOKEN_FILE: {token_file}"
    )]
    MissingEnv {
        region: String,
        role_arn: String,
        token_file: String,
    },
}

/// Server configuration document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub name: String,
    pub log: LogConfig,
    pub network: NetworkConfig,
    pub ecr: EcrConfig,
    pub notation: NotationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub ports: Ports,
    pub endpoints: Endpoints,
    pub tls: TlsConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ports: Ports::default(),
            endpoints: Endpoints::default(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ports {
    pub http: u16,
    pub https: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            http: 8080,
            https: 8443,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub health: String,
    pub metrics: String,
    pub validation: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            health: "/healthz".to_string(),
            metrics: "/metrics".to_string(),
            validation: "/validate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsConfig {
    pub crt_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EcrConfig {
    pub credential_cache: CredentialCacheConfig,
    pub ignore_registries: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialCacheConfig {
    pub enabled: bool,
    pub pre_auth_registries: Vec<String>,
    /// Seconds between background refresh passes
    pub cache_refresh_interval: u64,
    /// Lookahead window in seconds; entries expiring within it are refreshed
    pub cache_timeout_interval: u64,
    /// Upper bound on a single credential acquisition
    pub acquire_timeout_seconds: u64,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pre_auth_registries: Vec::new(),
            cache_refresh_interval: 300,
            cache_timeout_interval: 600,
            acquire_timeout_seconds: 30,
        }
    }
}

/// Settings for the notation CLI adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotationConfig {
    /// Path to the staged notation binary
    pub binary_path: String,
    pub cmd_version: String,
    pub cmd_verify: String,
    pub debug_enabled: bool,
    pub debug_flag: String,
    pub trust_store: String,
    pub root_cert: String,
    /// Environment variable the binary resolves its trust material from
    pub xdg_home_var: String,
    pub xdg_home_val: String,
    pub signer_endpoint: String,
    pub signer_debug: bool,
    /// Upper bound in seconds on a single verification
    pub timeout_seconds: u64,
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            binary_path: "/notation/bin/notation".to_string(),
            cmd_version: "version".to_string(),
            cmd_verify: "verify".to_string(),
            debug_enabled: false,
            debug_flag: "-d".to_string(),
            trust_store: "default".to_string(),
            root_cert: "root.crt".to_string(),
            xdg_home_var: "XDG_CONFIG_HOME".to_string(),
            xdg_home_val: "/notation/config".to_string(),
            signer_endpoint: String::new(),
            signer_debug: false,
            timeout_seconds: 30,
        }
    }
}

impl Config {
    /// Load the server configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_slice(&bytes)?;
        Ok(config)
    }
}

/// Registry hosts exempted from signature verification.
///
/// Built once from configuration, sorted, matched exactly. Read-only during
/// request handling.
#[derive(Debug, Clone, Default)]
pub struct BypassSet(BTreeSet<String>);

impl BypassSet {
    pub fn new(registries: impl IntoIterator<Item = String>) -> Self {
        Self(registries.into_iter().collect())
    }

    pub fn contains(&self, registry: &str) -> bool {
        self.0.contains(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// IRSA identity discovered from the pod environment
#[derive(Debug, Clone)]
pub struct AwsEnv {
    pub region: String,
    pub role_arn: String,
    pub token_file: String,
    pub account_id: String,
}

impl AwsEnv {
    /// Discover the IRSA triple from the environment.
    ///
    /// All three variables must be present; a partial identity cannot
    /// acquire registry credentials and is rejected at startup rather than
    /// at request time.
    pub fn discover() -> Result<Self, ConfigError> {
        let region = std::env::var("AWS_REGION").unwrap_or_default();
        let role_arn = std::env::var("AWS_ROLE_ARN").unwrap_or_default();
        let token_file = std::env::var("AWS_WEB_IDENTITY_TOKEN_FILE").unwrap_or_default();

        if region.is_empty() || role_arn.is_empty() || token_file.is_empty() {
            return Err(ConfigError::MissingEnv {
                region,
                role_arn,
                token_file,
            });
        }

        let account_id = account_from_role(&role_arn);
        Ok(Self {
            region,
            role_arn,
            token_file,
            account_id,
        })
    }

    /// Registry host for this controller's own account and region
    pub fn home_registry(&self) -> String {
        ECR_PATTERN
            .replacen("<ACCOUNT>", &self.account_id, 1)
            .replacen("<REGION>", &self.region, 1)
    }
}

/// Parse the AWS account ID out of a role ARN
pub fn account_from_role(role_arn: &str) -> String {
    let mut parts = role_arn.split(':');
    parts.nth(4).unwrap_or_default().to_string()
}

/// Notation trust policy document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPolicyDocument {
    pub version: String,
    #[serde(default)]
    pub trust_policies: Vec<TrustPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPolicy {
    pub name: String,
    #[serde(default)]
    pub registry_scopes: Vec<String>,
    pub signature_verification: SignatureVerification,
    #[serde(default)]
    pub trust_stores: Vec<String>,
    #[serde(default)]
    pub trusted_identities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerification {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#override: Option<VerificationOverride>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<String>,
}

impl TrustPolicyDocument {
    /// Load and validate the trust policy from a JSON file.
    ///
    /// The notation binary reads the policy itself from its config home;
    /// loading it here fails fast on a malformed document instead of failing
    /// on the first admission request.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let policy: TrustPolicyDocument = serde_json::from_slice(&bytes)?;
        Ok(policy)
    }
}
