//! Registry credential management.
//!
//! Holds the credential cache, the credential provider seam, and the small
//! parsers that map image references onto registry hosts and regions.

pub mod cache;
pub mod provider;

pub use cache::{CredentialCache, CredentialError};
pub use provider::{BasicCredentials, CredentialProvider, ProviderError, RegistryCredential};

use url::Url;

/// Derive the registry host from an image reference.
///
/// A reference with an explicit scheme is parsed as a URL; otherwise the
/// host is everything before the first `/`. A reference with no `/` is
/// treated as its own host so it still matches the bypass set exactly and
/// otherwise fails credential acquisition loudly.
pub fn registry_from_image(image: &str) -> String {
    if image.contains("://") {
        if let Ok(parsed) = Url::parse(image) {
            if let Some(host) = parsed.host_str() {
                return host.to_string();
            }
        }
    }

    image.split('/').next().unwrap_or(image).to_string()
}

/// Parse the AWS region out of an ECR registry host.
///
/// Hosts follow `<account>.dkr.ecr.<region>.amazonaws.com`; anything shorter
/// has no derivable region.
pub fn region_from_registry(registry: &str) -> Option<String> {
    let parts: Vec<&str> = registry.split('.').collect();
    if parts.len() >= 6 {
        parts.get(3).map(|region| (*region).to_string())
    } else {
        None
    }
}
