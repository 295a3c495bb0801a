//! # Runtime
//!
//! Process startup and the long-running loops of the operator.
//!
//! - `initialization`: crypto provider, tracing, metrics and health server
//! - `watch_loop`: controller watch over `ApplicationGateway` resources
//! - `error_policy`: per-gateway Fibonacci backoff after failed reconciles

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
