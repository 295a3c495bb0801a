//! # Custom Resource Definitions
//!
//! CRD types for the Application Gateway operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Resource spec, deployment settings and default values
//! - `source.rs` - Configuration source entries (literal, configmap, web, oidc_registration)
//! - `status.rs` - Status types for tracking reconciliation state

mod source;
mod spec;
mod status;

// Re-export all public types
pub use source::{
    ConfigurationEntry, HeaderEntry, HeaderType, PostDataEntry, SourceType,
};
pub use spec::{
    default_lang, default_replicas, ApplicationGateway, ApplicationGatewaySpec, CustomAnnotation,
    GatewayDeployment, HealthCheckSettings, PullSecretRef,
};
pub use status::{ApplicationGatewayStatus, Condition};
