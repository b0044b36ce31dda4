//! notation-admission library crate
//!
//! A validating admission webhook that admits workloads only when every
//! container image they reference carries a valid notation signature under
//! the configured trust policy.

pub mod admission;
pub mod config;
pub mod health;
pub mod notation;
pub mod registry;
pub mod verifier;
pub mod webhooks;

pub use admission::validator::WorkloadValidator;
pub use admission::{AdmissionRequest, AdmissionResult, AdmitHandler, Hook, HookError, Operation};
pub use config::{AwsEnv, BypassSet, Config, TrustPolicyDocument};
pub use health::HealthState;
pub use notation::{NotationCommand, SignatureVerifier};
pub use registry::{CredentialCache, CredentialProvider};
pub use verifier::ImageVerifier;
pub use webhooks::{run_webhook_server, WebhookState};
