//! notation-admission - a validating admission webhook for image signatures.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads the server configuration and trust policy documents
//! - Runs the notation self-check and trust-store bootstrap
//! - Preloads the registry credential cache
//! - Starts the health server, the TLS webhook server, and the
//!   background credential refresh task

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};

use notation_admission::config::{AwsEnv, BypassSet, Config, TrustPolicyDocument};
use notation_admission::health::{run_health_server, HealthState};
use notation_admission::notation::{NotationCommand, SignatureVerifier};
use notation_admission::registry::provider::EcrTokenProvider;
use notation_admission::registry::CredentialCache;
use notation_admission::verifier::ImageVerifier;
use notation_admission::webhooks::{run_webhook_server, WebhookState};
use notation_admission::WorkloadValidator;

/// Grace period for in-flight admission reviews to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "notation-admission")]
#[command(about = "Kubernetes validating admission webhook for notation image signatures")]
struct Args {
    /// Path to the server configuration YAML
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Path to the notation trust policy JSON
    #[arg(long = "trust-policy", value_name = "FILE")]
    trust_policy: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    // Initialize tracing; RUST_LOG overrides the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "info,notation_admission={}",
            config.log.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!(config = %args.config.display(), "starting notation-admission");

    let trust_policy = TrustPolicyDocument::load(&args.trust_policy)?;
    info!(
        version = %trust_policy.version,
        policies = trust_policy.trust_policies.len(),
        "trust policy loaded"
    );

    require_files(&[
        &config.network.tls.crt_file,
        &config.network.tls.key_file,
        &config.notation.binary_path,
        &config.notation.xdg_home_val,
    ])?;

    // Notation self-check and trust-store bootstrap
    let notation = Arc::new(NotationCommand::new(config.notation.clone()));
    let version = notation.version().await?;
    info!(version = %version, "notation binary ready");

    if Path::new(&config.notation.root_cert).exists() {
        match notation.add_trust_store_cert().await {
            Ok(_) => info!(
                store = %config.notation.trust_store,
                cert = %config.notation.root_cert,
                "root certificate registered with trust store"
            ),
            // The certificate may already be registered from a previous boot
            Err(e) => warn!(error = %e, "could not register root certificate"),
        }
    }

    // Registry credential cache under the pod's IRSA identity
    let aws_env = AwsEnv::discover()?;
    debug!(
        region = %aws_env.region,
        account = %aws_env.account_id,
        "discovered AWS identity"
    );

    let acquire_timeout =
        Duration::from_secs(config.ecr.credential_cache.acquire_timeout_seconds);
    let provider = EcrTokenProvider::new(aws_env.clone(), acquire_timeout);
    let cache = Arc::new(CredentialCache::new(Arc::new(provider)));

    if config.ecr.credential_cache.enabled {
        cache
            .preload(
                &config.ecr.credential_cache.pre_auth_registries,
                &aws_env.home_registry(),
            )
            .await?;
        info!(entries = cache.len().await, "credential cache preloaded");
    }

    let bypass = BypassSet::new(config.ecr.ignore_registries.clone());
    let image_verifier = Arc::new(ImageVerifier::new(
        cache.clone(),
        notation.clone() as Arc<dyn SignatureVerifier>,
        bypass,
    ));
    let hook = WorkloadValidator::new(image_verifier).into_hook();

    let health_state = Arc::new(HealthState::new());

    // Health server starts immediately so probes work during warm-up
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.network.ports.http;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("health server error: {}", e);
            }
        })
    };

    // Background credential refresh, conditional on the cache flag
    let refresh_handle = if config.ecr.credential_cache.enabled {
        let cache = cache.clone();
        let health_state = health_state.clone();
        let interval = Duration::from_secs(config.ecr.credential_cache.cache_refresh_interval);
        let lookahead = Duration::from_secs(config.ecr.credential_cache.cache_timeout_interval);
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                info!("waking up to refresh cached registry credentials");
                if let Err(e) = cache.refresh(lookahead).await {
                    error!(error = %e, "credential refresh failed");
                    health_state.metrics.record_refresh_error();
                }
                let entries = i64::try_from(cache.len().await).unwrap_or(i64::MAX);
                health_state.metrics.set_cache_entries(entries);
            }
        }))
    } else {
        info!("credential cache disabled, refresh task not started");
        None
    };

    // Webhook server over TLS
    let webhook_handle = {
        let state = Arc::new(WebhookState::new(hook, health_state.clone()));
        let path = config.network.endpoints.validation.clone();
        let port = config.network.ports.https;
        let cert = config.network.tls.crt_file.clone();
        let key = config.network.tls.key_file.clone();
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, &path, port, &cert, &key).await {
                error!("webhook server error: {}", e);
            }
        })
    };

    health_state.set_ready(true).await;
    info!("startup checks passed, serving admission requests");

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            if let Err(e) = result {
                error!("webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("health server task panicked: {}", e);
            }
        }
        result = async {
            match refresh_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("credential refresh task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;
            info!(
                "waiting {}s for in-flight admission reviews to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
        }
    }

    info!("notation-admission stopped");
    Ok(())
}

/// Verify required files exist before serving; a webhook that boots without
/// its TLS material or verifier binary would fail every request at runtime
fn require_files(paths: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    for path in paths {
        if !Path::new(path).exists() {
            return Err(format!("file not found: {path}").into());
        }
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
