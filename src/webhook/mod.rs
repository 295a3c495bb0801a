//! # Admission Webhook
//!
//! Mutating admission webhook that injects the gateway sidecar into annotated
//! Pods and Deployments.
//!
//! - `annotations`: Reading and diffing the gateway annotations
//! - `patch`: RFC6902 patch construction
//! - `sidecar`: Rendering of the injected container, Service and ConfigMap
//! - `mutate`: Admission decisions and side effects
//!
//! The router exposes a single endpoint, `POST /mutate`.

pub mod annotations;
pub mod mutate;
pub mod patch;
pub mod sidecar;
mod tls;

pub use mutate::{AdmissionPatchBuilder, Mutation};

use crate::config::ControllerConfig;
use anyhow::Context;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Router serving the mutation endpoint
pub fn router(builder: Arc<AdmissionPatchBuilder>) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(builder)
}

async fn mutate_handler(
    State(builder): State<Arc<AdmissionPatchBuilder>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(builder.handle(&request).await.into_review())
}

/// Serve the webhook until the process exits.
///
/// TLS is terminated in-process when both a certificate and a key are
/// configured; otherwise the router is served over plain HTTP.
pub async fn run_webhook_server(
    builder: Arc<AdmissionPatchBuilder>,
    config: &ControllerConfig,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let app = router(builder);

    match (&config.webhook_tls_cert, &config.webhook_tls_key) {
        (Some(cert), Some(key)) => {
            let tls_config = tls::load_server_config(cert, key)
                .context("Failed to load webhook TLS material")?;
            tls::serve(addr, app, tls_config).await
        }
        (None, None) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;
            info!("Admission webhook listening on http://{}", addr);
            axum::serve(listener, app).await?;
            Ok(())
        }
        _ => anyhow::bail!("WEBHOOK_TLS_CERT and WEBHOOK_TLS_KEY must be set together"),
    }
}
