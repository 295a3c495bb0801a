//! # Configuration
//!
//! Process-level settings loaded from environment variables.
//!
//! - `controller`: controller, webhook and outbound HTTP settings

mod controller;

pub use controller::{ControllerConfig, FailurePolicy};
