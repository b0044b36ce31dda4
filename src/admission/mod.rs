//! Admission hook dispatching.
//!
//! A [`Hook`] holds up to four registered handlers, one per admission
//! operation. Requests carry the operation as the raw wire string so a value
//! outside the known set stays representable and is answered with an explicit
//! deny rather than a decode failure.

pub mod validator;
pub mod workload;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Admission operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    /// Parse an operation from the wire string, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATE" => Some(Operation::Create),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            "CONNECT" => Some(Operation::Connect),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Connect => write!(f, "CONNECT"),
        }
    }
}

/// One admission request, consumed read-only
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// Correlation identifier echoed back in the response
    pub uid: String,
    /// Operation as declared on the wire
    pub operation: String,
    /// Raw workload document
    pub object: Value,
}

/// Decision returned to the transport layer
#[derive(Debug, Clone, Default)]
pub struct AdmissionResult {
    pub allowed: bool,
    pub message: String,
    pub warnings: Vec<String>,
}

impl AdmissionResult {
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: message.into(),
            warnings: Vec::new(),
        }
    }
}

/// Errors surfaced by hook execution
#[derive(Error, Debug)]
pub enum HookError {
    /// No handler is registered for a recognized operation. This is a
    /// configuration gap, not an implicit allow or deny.
    #[error("operation {0} is not registered")]
    NotRegistered(Operation),
}

/// Capability that decides one admission request
#[async_trait]
pub trait AdmitHandler: Send + Sync {
    async fn admit(&self, request: &AdmissionRequest) -> Result<AdmissionResult, HookError>;
}

/// Set of handlers for each admission operation
#[derive(Clone, Default)]
pub struct Hook {
    create: Option<Arc<dyn AdmitHandler>>,
    update: Option<Arc<dyn AdmitHandler>>,
    delete: Option<Arc<dyn AdmitHandler>>,
    connect: Option<Arc<dyn AdmitHandler>>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(mut self, handler: Arc<dyn AdmitHandler>) -> Self {
        self.create = Some(handler);
        self
    }

    pub fn on_update(mut self, handler: Arc<dyn AdmitHandler>) -> Self {
        self.update = Some(handler);
        self
    }

    pub fn on_delete(mut self, handler: Arc<dyn AdmitHandler>) -> Self {
        self.delete = Some(handler);
        self
    }

    pub fn on_connect(mut self, handler: Arc<dyn AdmitHandler>) -> Self {
        self.connect = Some(handler);
        self
    }

    /// Route the request to the handler registered for its operation.
    ///
    /// An operation outside the known set yields an explicit non-allowed
    /// result; a known but unregistered operation is a [`HookError`].
    pub async fn execute(
        &self,
        request: &AdmissionRequest,
    ) -> Result<AdmissionResult, HookError> {
        let Some(operation) = Operation::parse(&request.operation) else {
            return Ok(AdmissionResult::denied(format!(
                "invalid operation: {}",
                request.operation
            )));
        };

        let handler = match operation {
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
            Operation::Connect => self.connect.as_ref(),
        };

        match handler {
            Some(handler) => handler.admit(request).await,
            None => Err(HookError::NotRegistered(operation)),
        }
    }
}
