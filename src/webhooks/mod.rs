//! Admission webhook transport.
//!
//! Serves the validation endpoint over TLS and adapts the wire-level
//! AdmissionReview envelope onto the hook dispatcher. Requests that are not
//! POSTed JSON are rejected before the pipeline is invoked.

mod server;

pub use server::{
    create_webhook_router, run_webhook_server, ReviewEnvelope, WebhookError, WebhookState,
    ADMISSION_REVIEW_KIND, ADMISSION_REVIEW_VERSION,
};
