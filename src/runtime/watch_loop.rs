//! # Watch Loop
//!
//! Controller watch loop over `ApplicationGateway` resources. Owned
//! Deployments and referenced ConfigMaps also trigger reconciliation.

use crate::controller::reconciler::{gateways_referencing_config_map, reconcile, Reconciler};
use crate::crd::ApplicationGateway;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::{watcher, Controller};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope> + DeserializeOwned,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Run the controller watch loop
///
/// The watch restarts when its stream ends and stops once a shutdown signal
/// has marked the server as not ready.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let namespace = reconciler.config.watch_namespace.clone();
    info!(
        namespace = namespace.as_deref().unwrap_or("<all>"),
        "Starting controller watch loop..."
    );

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let gateways: Api<ApplicationGateway> = scoped_api(&client, namespace.as_deref());
        let deployments: Api<Deployment> = scoped_api(&client, namespace.as_deref());
        let config_maps: Api<ConfigMap> = scoped_api(&client, namespace.as_deref());

        let controller = Controller::new(gateways, watcher::Config::default().any_semantic());
        let gateway_cache = controller.store();

        controller
            .owns(deployments, watcher::Config::default())
            .watches(config_maps, watcher::Config::default(), move |config_map| {
                gateways_referencing_config_map(&gateway_cache.state(), &config_map)
            })
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .for_each(|result| {
                match result {
                    Ok((gateway, _)) => debug!(
                        resource.name = gateway.name.as_str(),
                        resource.namespace = gateway.namespace.as_deref().unwrap_or_default(),
                        "watch.event.success"
                    ),
                    Err(e) => warn!(error = %e, "Controller stream error"),
                }
                futures::future::ready(())
            })
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = reconciler.config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
