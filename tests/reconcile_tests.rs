//! # Reconciliation Tests
//!
//! Passes of the gateway controller against the in-memory store, from the
//! first Deployment to scale and configuration rollouts and failures.

mod common;

use app_gateway_operator::config::ControllerConfig;
use app_gateway_operator::constants::{
    CHANGE_CAUSE_ANNOTATION, CONFIG_MAP_LABEL, CONFIG_VERSION_LABEL,
};
use app_gateway_operator::controller::reconciler::config_map::config_version;
use app_gateway_operator::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use app_gateway_operator::crd::{
    ApplicationGateway, ApplicationGatewaySpec, ConfigurationEntry, GatewayDeployment, SourceType,
};
use app_gateway_operator::error::Error;
use app_gateway_operator::runtime::error_policy::handle_reconciliation_error;
use app_gateway_operator::store::EventSeverity;
use common::{FakeFetcher, FakeStore};
use k8s_openapi::api::apps::v1::Deployment;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

const NS: &str = "apps";

fn literal(value: &str) -> ConfigurationEntry {
    ConfigurationEntry {
        value: Some(value.to_string()),
        ..ConfigurationEntry::new(SourceType::Literal)
    }
}

fn gateway(replicas: i32, configuration: Vec<ConfigurationEntry>) -> ApplicationGateway {
    let mut gw = ApplicationGateway::new(
        "edge",
        ApplicationGatewaySpec {
            replicas,
            deployment: GatewayDeployment {
                image: "gateway:24.12".into(),
                lang: "en_US.utf8".into(),
                ..Default::default()
            },
            configuration,
        },
    );
    gw.metadata.namespace = Some(NS.into());
    gw
}

fn setup() -> (Arc<FakeStore>, Arc<Reconciler>) {
    let store = Arc::new(FakeStore::new());
    let fetcher = Arc::new(FakeFetcher::new());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        fetcher,
        ControllerConfig::default(),
    ));
    (store, reconciler)
}

/// The gateway as the next watch event would deliver it
fn observed(store: &FakeStore, mut gw: ApplicationGateway) -> Arc<ApplicationGateway> {
    gw.status = store.status(NS, "edge");
    Arc::new(gw)
}

fn template_label(deployment: &Deployment, label: &str) -> Option<String> {
    deployment
        .spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .labels
        .as_ref()?
        .get(label)
        .cloned()
}

#[tokio::test]
async fn test_first_pass_creates_the_deployment() {
    let (store, reconciler) = setup();

    let action = reconcile(Arc::new(gateway(2, vec![literal("a: 1\n")])), reconciler)
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let deployment = store.deployment(NS, "edge").expect("deployment created");
    assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(2));
    assert_eq!(
        template_label(&deployment, CONFIG_VERSION_LABEL),
        Some(config_version("a: 1\n"))
    );

    let config_map_name = template_label(&deployment, CONFIG_MAP_LABEL).unwrap();
    assert!(config_map_name.starts_with("edge-config-gateway-generated"));
    assert_eq!(
        store.config_map(NS, &config_map_name).unwrap().data.unwrap()["config.yaml"],
        "a: 1\n"
    );

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::Normal);
    assert_eq!(events[0].reason, "Created");

    let status = store.status(NS, "edge").unwrap();
    assert!(status.ready);
    assert_eq!(status.replicas, Some(2));
    assert_eq!(status.version, Some(config_version("a: 1\n")));
    assert_eq!(status.config_map_name, Some(config_map_name));
}

#[tokio::test]
async fn test_converged_gateway_is_rechecked_later() {
    let (store, reconciler) = setup();
    let desired = gateway(2, vec![literal("a: 1\n")]);
    reconcile(Arc::new(desired.clone()), reconciler.clone())
        .await
        .unwrap();

    let action = reconcile(observed(&store, desired), reconciler)
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    assert_eq!(store.calls_to("replace_deployment"), 0);
    assert_eq!(store.calls_to("replace_config_map"), 0);
    assert_eq!(store.calls_to("create_config_map"), 1);
    assert_eq!(store.events().len(), 1);
}

#[tokio::test]
async fn test_replica_change_only_scales() {
    let (store, reconciler) = setup();
    reconcile(Arc::new(gateway(2, vec![literal("a: 1\n")])), reconciler.clone())
        .await
        .unwrap();
    let before = store.deployment(NS, "edge").unwrap();

    let action = reconcile(
        observed(&store, gateway(3, vec![literal("a: 1\n")])),
        reconciler,
    )
    .await
    .unwrap();

    assert_eq!(action, Action::await_change());
    let after = store.deployment(NS, "edge").unwrap();
    assert_eq!(after.spec.as_ref().unwrap().replicas, Some(3));
    assert_eq!(
        after.spec.as_ref().unwrap().template,
        before.spec.as_ref().unwrap().template,
        "scaling leaves the pod template alone"
    );
    assert_eq!(store.status(NS, "edge").unwrap().replicas, Some(3));
    assert!(store.events().iter().all(|e| e.reason != "Updated"));
}

#[tokio::test]
async fn test_configuration_change_rolls_out_in_place() {
    let (store, reconciler) = setup();
    reconcile(Arc::new(gateway(2, vec![literal("a: 1\n")])), reconciler.clone())
        .await
        .unwrap();
    let config_map_name = store.config_map_names(NS).remove(0);

    reconcile(
        observed(&store, gateway(2, vec![literal("a: 2\n")])),
        reconciler,
    )
    .await
    .unwrap();

    assert_eq!(store.config_map_names(NS), vec![config_map_name.clone()]);
    assert_eq!(
        store.config_map(NS, &config_map_name).unwrap().data.unwrap()["config.yaml"],
        "a: 2\n"
    );

    let deployment = store.deployment(NS, "edge").unwrap();
    assert_eq!(
        template_label(&deployment, CONFIG_VERSION_LABEL),
        Some(config_version("a: 2\n"))
    );
    let change_cause = deployment.metadata.annotations.unwrap()[CHANGE_CAUSE_ANNOTATION].clone();
    assert!(change_cause.contains("Configuration change"), "{change_cause}");

    let updated: Vec<_> = store
        .events()
        .into_iter()
        .filter(|e| e.reason == "Updated")
        .collect();
    assert_eq!(updated.len(), 1);
    assert_eq!(
        store.status(NS, "edge").unwrap().version,
        Some(config_version("a: 2\n"))
    );
}

#[tokio::test]
async fn test_image_change_is_recorded_as_change_cause() {
    let (store, reconciler) = setup();
    reconcile(Arc::new(gateway(1, vec![literal("a: 1\n")])), reconciler.clone())
        .await
        .unwrap();

    let mut upgraded = gateway(1, vec![literal("a: 1\n")]);
    upgraded.spec.deployment.image = "gateway:25.01".into();
    reconcile(observed(&store, upgraded), reconciler).await.unwrap();

    let deployment = store.deployment(NS, "edge").unwrap();
    let pod = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    assert_eq!(pod.containers[0].image.as_deref(), Some("gateway:25.01"));
    assert_eq!(
        deployment.metadata.annotations.unwrap()[CHANGE_CAUSE_ANNOTATION],
        "Image changed from gateway:24.12 to gateway:25.01"
    );
}

#[tokio::test]
async fn test_failure_is_reported_on_the_gateway() {
    let (store, reconciler) = setup();
    let missing = ConfigurationEntry {
        name: Some("absent".into()),
        data_key: Some("config.yaml".into()),
        ..ConfigurationEntry::new(SourceType::ConfigMap)
    };

    let err = reconcile(Arc::new(gateway(1, vec![missing])), reconciler)
        .await
        .unwrap_err();

    assert!(
        matches!(err, ReconcilerError::Gateway(Error::NotFound { .. })),
        "got {err:?}"
    );
    assert!(store.deployment(NS, "edge").is_none());

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::Warning);
    assert_eq!(events[0].reason, "Failed");

    let status = store.status(NS, "edge").unwrap();
    assert!(!status.ready);
    assert_eq!(status.conditions[0].status, "False");
}

#[tokio::test]
async fn test_error_policy_backs_off_per_gateway() {
    let (_store, reconciler) = setup();
    let failing = Arc::new(gateway(1, vec![]));
    let error = ReconcilerError::Gateway(Error::validation("no configuration"));

    let delays: Vec<Action> = (0..3)
        .map(|_| handle_reconciliation_error(failing.clone(), &error, reconciler.clone()))
        .collect();
    assert_eq!(
        delays,
        vec![
            Action::requeue(Duration::from_secs(60)),
            Action::requeue(Duration::from_secs(60)),
            Action::requeue(Duration::from_secs(120)),
        ]
    );

    let mut other = gateway(1, vec![]);
    other.metadata.name = Some("other".into());
    assert_eq!(
        handle_reconciliation_error(Arc::new(other), &error, reconciler.clone()),
        Action::requeue(Duration::from_secs(60)),
        "backoff is tracked per gateway"
    );

    reconciler.reset_backoff("apps/edge");
    assert_eq!(
        handle_reconciliation_error(failing, &error, reconciler),
        Action::requeue(Duration::from_secs(60))
    );
}

#[tokio::test]
async fn test_failed_first_rollout_removes_its_config_map() {
    let (store, reconciler) = setup();
    store.fail_on("create_deployment");
    let desired = gateway(1, vec![literal("a: 1\n")]);

    for _ in 0..3 {
        reconcile(observed(&store, desired.clone()), reconciler.clone())
            .await
            .unwrap_err();
    }

    assert!(
        store.config_map_names(NS).is_empty(),
        "retries must not pile up generated ConfigMaps: {:?}",
        store.config_map_names(NS)
    );
    assert_eq!(store.calls_to("create_config_map"), 3);
    assert_eq!(store.calls_to("delete_config_map"), 3);
    assert!(!store.status(NS, "edge").unwrap().ready);
}

#[tokio::test]
async fn test_existing_config_map_survives_a_failed_update() {
    let (store, reconciler) = setup();
    reconcile(Arc::new(gateway(1, vec![literal("a: 1\n")])), reconciler.clone())
        .await
        .unwrap();
    store.fail_on("replace_deployment");

    reconcile(
        observed(&store, gateway(1, vec![literal("a: 2\n")])),
        reconciler,
    )
    .await
    .unwrap_err();

    assert_eq!(store.config_map_names(NS).len(), 1);
    assert_eq!(store.calls_to("delete_config_map"), 0);
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn test_reconcile_future_is_send() {
    let (_store, reconciler) = setup();
    let pass = reconcile(Arc::new(gateway(1, vec![literal("a: 1\n")])), reconciler);
    assert_send(&pass);
}
