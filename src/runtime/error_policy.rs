//! # Error Policy
//!
//! Requeue decision after a failed reconciliation.

use crate::controller::reconciler::types::resource_key;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::ApplicationGateway;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per gateway so one failing gateway does not
/// delay the others.
pub fn handle_reconciliation_error(
    obj: Arc<ApplicationGateway>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);
    metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = ctx.next_backoff(&resource_key(namespace, name));
    let delay = Duration::from_secs(backoff_seconds);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, next attempt: {})",
        backoff_seconds,
        error_count,
        next_trigger_time.to_rfc3339()
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}
