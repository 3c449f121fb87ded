//! OpenTelemetry Operator - manifest compilers and admission hooks
//!
//! Turns OpenTelemetry custom resources into the Kubernetes objects that run
//! them, and guards OpAMPBridge resources at admission time.
//!
//! # Architecture
//!
//! Three peer compilers, one per managed component:
//! - OpAMP bridge: a Deployment reporting collectors to an OpAMP server
//! - Collector: a Deployment or DaemonSet, depending on the mode
//! - Target allocator: a Deployment sharding Prometheus targets over collectors
//!
//! Each compiler is a set of pure functions over the resource and the shared
//! read-only [`config::Config`]. Reconciliation, applying the manifests and
//! persisting resources are left to the caller.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (OpAMPBridge, OpenTelemetryCollector)
//! - [`manifests`] - Per-component compilers producing ConfigMaps, ServiceAccounts and workloads
//! - [`labels`] - Identity and selector labels, plus user label filtering
//! - [`annotations`] - Annotation synthesis and config checksums
//! - [`naming`] - Names of generated objects
//! - [`webhook`] - OpAMPBridge defaulting and validation, with an axum envelope
//! - [`config`] - Process-wide operator configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod annotations;
pub mod config;
pub mod crd;
pub mod error;
pub mod labels;
pub mod manifests;
pub mod naming;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default listen address of the admission webhook server
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:9443";
