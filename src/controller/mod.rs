//! # Controller
//!
//! Core controller modules for the Application Gateway operator.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: Core reconciliation logic

pub mod backoff;
pub mod reconciler;
