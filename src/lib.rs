//! Application Gateway Operator Library
//!
//! Core functionality of the Application Gateway operator: configuration
//! document merging, configuration source resolution, OIDC client
//! provisioning, the `ApplicationGateway` controller and the sidecar
//! injecting admission webhook.
//!
//! ## Quick Start
//!
//! ```rust
//! use app_gateway_operator::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod document;
pub mod error;
pub mod http;
pub mod observability;
pub mod oidc;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod source;
pub mod store;
pub mod webhook;
