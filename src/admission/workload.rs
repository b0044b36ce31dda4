//! Workload extraction.
//!
//! Decodes a raw workload document into its identity and the ordered list of
//! container image references. The `kind` discriminator is read generically
//! first, then the document is re-decoded into the typed shape for that kind
//! so malformed documents fail loudly rather than yielding partial data.

use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while extracting a workload
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// Document is not well-formed or does not match its declared kind
    #[error("could not parse workload document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document carries no `kind` discriminator
    #[error("workload document has no kind")]
    MissingKind,

    /// Declared kind is outside the supported set
    #[error("kind {0} not supported by validation controller")]
    UnsupportedKind(String),
}

/// Supported workload kinds; each carries a container-bearing pod template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Deployment,
    ReplicaSet,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Pod" => Some(WorkloadKind::Pod),
            "Deployment" => Some(WorkloadKind::Deployment),
            "ReplicaSet" => Some(WorkloadKind::ReplicaSet),
            "DaemonSet" => Some(WorkloadKind::DaemonSet),
            "StatefulSet" => Some(WorkloadKind::StatefulSet),
            "Job" => Some(WorkloadKind::Job),
            "CronJob" => Some(WorkloadKind::CronJob),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
        };
        write!(f, "{}", name)
    }
}

/// Workload identity and its image references, in declaration order
#[derive(Debug, Clone)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    /// Primary, then init, then ephemeral containers; duplicates preserved
    pub images: Vec<String>,
}

/// Parse a raw workload document
pub fn parse(object: &[u8]) -> Result<Workload, WorkloadError> {
    let value: Value = serde_json::from_slice(object)?;
    parse_value(&value)
}

/// Parse an already-decoded workload document
pub fn parse_value(object: &Value) -> Result<Workload, WorkloadError> {
    let kind_name = object
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(WorkloadError::MissingKind)?;
    let kind = WorkloadKind::parse(kind_name)
        .ok_or_else(|| WorkloadError::UnsupportedKind(kind_name.to_string()))?;

    let (metadata, spec) = match kind {
        WorkloadKind::Pod => {
            let pod: Pod = serde_json::from_value(object.clone())?;
            (pod.metadata, pod.spec)
        }
        WorkloadKind::Deployment => {
            let deployment: Deployment = serde_json::from_value(object.clone())?;
            let spec = deployment.spec.and_then(|s| s.template.spec);
            (deployment.metadata, spec)
        }
        WorkloadKind::ReplicaSet => {
            let replica_set: ReplicaSet = serde_json::from_value(object.clone())?;
            let spec = replica_set
                .spec
                .and_then(|s| s.template)
                .and_then(|t| t.spec);
            (replica_set.metadata, spec)
        }
        WorkloadKind::DaemonSet => {
            let daemon_set: DaemonSet = serde_json::from_value(object.clone())?;
            let spec = daemon_set.spec.and_then(|s| s.template.spec);
            (daemon_set.metadata, spec)
        }
        WorkloadKind::StatefulSet => {
            let stateful_set: StatefulSet = serde_json::from_value(object.clone())?;
            let spec = stateful_set.spec.and_then(|s| s.template.spec);
            (stateful_set.metadata, spec)
        }
        WorkloadKind::Job => {
            let job: Job = serde_json::from_value(object.clone())?;
            let spec = job.spec.and_then(|s| s.template.spec);
            (job.metadata, spec)
        }
        WorkloadKind::CronJob => {
            let cron_job: CronJob = serde_json::from_value(object.clone())?;
            let spec = cron_job
                .spec
                .and_then(|s| s.job_template.spec)
                .and_then(|j| j.template.spec);
            (cron_job.metadata, spec)
        }
    };

    Ok(Workload {
        kind,
        name: name_of(&metadata),
        namespace: namespace_of(&metadata),
        images: images_from_spec(spec.as_ref()),
    })
}

fn name_of(metadata: &ObjectMeta) -> String {
    metadata.name.clone().unwrap_or_default()
}

fn namespace_of(metadata: &ObjectMeta) -> String {
    metadata.namespace.clone().unwrap_or_default()
}

/// Concatenate image references: primary, then init, then ephemeral.
/// No deduplication; each declared slot is verified independently.
fn images_from_spec(spec: Option<&PodSpec>) -> Vec<String> {
    let Some(spec) = spec else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for container in &spec.containers {
        if let Some(image) = &container.image {
            images.push(image.clone());
        }
    }
    if let Some(init_containers) = &spec.init_containers {
        for container in init_containers {
            if let Some(image) = &container.image {
                images.push(image.clone());
            }
        }
    }
    if let Some(ephemeral_containers) = &spec.ephemeral_containers {
        for container in ephemeral_containers {
            if let Some(image) = &container.image {
                images.push(image.clone());
            }
        }
    }
    images
}
