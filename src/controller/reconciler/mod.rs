//! # Reconciler
//!
//! Core reconciliation logic for `ApplicationGateway` resources.
//!
//! The reconciler:
//! - Resolves the ordered configuration sources into one merged document
//! - Keeps the generated ConfigMap in step with that document
//! - Creates, scales or updates the gateway Deployment
//! - Updates resource status with reconciliation results
//!
//! ## Reconciliation Flow
//!
//! 1. Read the live Deployment
//! 2. Resolve configuration (literal, configmap, web, then OIDC registration)
//! 3. Ensure the generated ConfigMap and compute the config version
//! 4. Plan with the diff engine: create, scale, update or requeue
//! 5. Update status

pub mod config_map;
pub mod diff;
pub mod reconcile;
pub mod status;
pub mod triggers;
pub mod types;
pub mod workload;

// Re-export public API
pub use diff::{plan, DesiredWorkloadState, LiveWorkload, ReconcileAction};
pub use reconcile::reconcile;
pub use triggers::gateways_referencing_config_map;
pub use types::{BackoffState, Reconciler, ReconcilerError};
