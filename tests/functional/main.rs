// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the admission verification pipeline.
//!
//! These tests drive the full pipeline (hook dispatch, workload parsing,
//! credential cache, signature verification, decision rendering) WITHOUT a
//! live Kubernetes cluster, a real registry, or the notation binary. The
//! credential provider and the verifier are mocked at their trait seams; all
//! of the orchestration in between is production code.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_deployment_with_bypassed_registry_allows
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Dispatcher tests**: Operation routing, unknown operations,
//!   unregistered handlers
//! - **Pipeline tests**: End-to-end admission decisions over real workload
//!   documents (allow, deny, bypass, credential failure)

mod dispatcher_tests;
mod mocks;
mod pipeline_tests;

// Re-export for use in tests
pub use mocks::*;
