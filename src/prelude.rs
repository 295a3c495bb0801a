//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use app_gateway_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Configuration documents and their sources
pub use crate::document::{fold, merge, ConfigNode, Scalar};
pub use crate::source::{ConfigSourceResolver, ConfigurationSource};

// Seams for cluster and outbound HTTP access
pub use crate::http::{HttpFetcher, HttpRequest, HttpResponse};
pub use crate::store::{ObjectStore, StoreError};

pub use crate::oidc::{OidcClientProvisioner, ProvisionOutcome};

// Reconciler types
pub use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};

pub use crate::webhook::{AdmissionPatchBuilder, Mutation};

pub use crate::config::{ControllerConfig, FailurePolicy};
pub use crate::error::{Error, Result};
