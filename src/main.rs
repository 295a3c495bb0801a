//! # Application Gateway Operator
//!
//! Kubernetes operator that keeps application gateway Deployments in line
//! with their `ApplicationGateway` resources, plus a mutating admission
//! webhook that injects the gateway as a sidecar into annotated workloads.
//!
//! ## Modes
//!
//! - `controller` - watch `ApplicationGateway` resources and reconcile them
//! - `webhook` - serve `POST /mutate` for admission reviews
//! - `all` - both in one process (default)
//!
//! Metrics and health checks are served on `METRICS_PORT` in every mode.

use anyhow::Result;
use app_gateway_operator::config::ControllerConfig;
use app_gateway_operator::controller::reconciler::Reconciler;
use app_gateway_operator::runtime::initialization::{init_process, initialize, InitializationResult};
use app_gateway_operator::runtime::watch_loop::run_watch_loop;
use app_gateway_operator::source::ConfigSourceResolver;
use app_gateway_operator::webhook::{run_webhook_server, AdmissionPatchBuilder};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Controller,
    Webhook,
    All,
}

/// Application Gateway operator
#[derive(Debug, Parser)]
#[command(name = "app-gateway-operator", version, about, long_about = None)]
struct Cli {
    /// Components to run in this process
    #[arg(long, value_enum, env = "OPERATOR_MODE", default_value_t = Mode::All)]
    mode: Mode,

    /// Port of the metrics and health server (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Port of the admission webhook (overrides WEBHOOK_PORT)
    #[arg(long)]
    webhook_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_process()?;

    let mut config = ControllerConfig::from_env();
    if let Some(port) = cli.metrics_port {
        config.metrics_port = port;
    }
    if let Some(port) = cli.webhook_port {
        config.webhook_port = port;
    }
    info!(mode = ?cli.mode, "Loaded configuration: {:?}", config);

    let init = initialize(config).await?;

    match cli.mode {
        Mode::Controller => {
            run_watch_loop(init.client.clone(), reconciler(&init), init.server_state).await?;
        }
        Mode::Webhook => {
            tokio::select! {
                result = run_webhook_server(admission_builder(&init), &init.config) => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping admission webhook");
                    init.server_state.set_ready(false);
                }
            }
        }
        Mode::All => {
            let builder = admission_builder(&init);
            let webhook_config = init.config.clone();
            let webhook = tokio::spawn(async move {
                if let Err(e) = run_webhook_server(builder, &webhook_config).await {
                    error!("Admission webhook error: {:#}", e);
                }
            });

            let result =
                run_watch_loop(init.client.clone(), reconciler(&init), init.server_state).await;
            webhook.abort();
            result?;
        }
    }

    Ok(())
}

fn reconciler(init: &InitializationResult) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(
        Arc::clone(&init.store),
        Arc::clone(&init.fetcher),
        init.config.clone(),
    ))
}

fn admission_builder(init: &InitializationResult) -> Arc<AdmissionPatchBuilder> {
    let resolver = Arc::new(ConfigSourceResolver::new(
        Arc::clone(&init.store),
        Arc::clone(&init.fetcher),
    ));
    Arc::new(AdmissionPatchBuilder::new(
        Arc::clone(&init.store),
        resolver,
        init.config.failure_policy,
    ))
}
