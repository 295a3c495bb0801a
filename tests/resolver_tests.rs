//! # Configuration Resolution Tests
//!
//! Resolution of ordered source lists against in-memory fakes:
//! - layering order and sequence concatenation
//! - ConfigMap and web lookups, including secret-backed headers
//! - failures abort the whole resolution

mod common;

use app_gateway_operator::crd::{ConfigurationEntry, HeaderEntry, HeaderType, SourceType};
use app_gateway_operator::document::ConfigNode;
use app_gateway_operator::error::Error;
use app_gateway_operator::source::{sources_from_entries, ConfigSourceResolver};
use common::{config_map, secret, FakeFetcher, FakeStore};
use std::sync::Arc;

const NS: &str = "apps";

fn literal(value: &str) -> ConfigurationEntry {
    ConfigurationEntry {
        value: Some(value.to_string()),
        ..ConfigurationEntry::new(SourceType::Literal)
    }
}

fn config_map_entry(name: &str, data_key: &str) -> ConfigurationEntry {
    ConfigurationEntry {
        name: Some(name.to_string()),
        data_key: Some(data_key.to_string()),
        ..ConfigurationEntry::new(SourceType::ConfigMap)
    }
}

fn web(url: &str, headers: Vec<HeaderEntry>) -> ConfigurationEntry {
    ConfigurationEntry {
        url: Some(url.to_string()),
        headers,
        ..ConfigurationEntry::new(SourceType::Web)
    }
}

fn oidc(secret_name: &str) -> ConfigurationEntry {
    ConfigurationEntry {
        discovery_endpoint: Some("https://idp.example.com/.well-known/openid-configuration".into()),
        secret: Some(secret_name.to_string()),
        ..ConfigurationEntry::new(SourceType::OidcRegistration)
    }
}

fn setup() -> (Arc<FakeStore>, Arc<FakeFetcher>, ConfigSourceResolver) {
    let store = Arc::new(FakeStore::new());
    let fetcher = Arc::new(FakeFetcher::new());
    let resolver = ConfigSourceResolver::new(store.clone(), fetcher.clone());
    (store, fetcher, resolver)
}

async fn resolve(
    resolver: &ConfigSourceResolver,
    entries: &[ConfigurationEntry],
) -> Result<ConfigNode, Error> {
    let sources = sources_from_entries(entries)?;
    resolver.resolve(NS, &sources).await
}

fn text<'a>(doc: &'a ConfigNode, path: &[&str]) -> Option<&'a str> {
    doc.lookup(path).and_then(ConfigNode::as_str)
}

#[tokio::test]
async fn test_later_sources_override_earlier_ones() {
    let (store, fetcher, resolver) = setup();
    store.insert_config_map(config_map(
        NS,
        "edge-base",
        &[(
            "config.yaml",
            "server:\n  worker_threads: '4'\n  hosts:\n    - a.example.com\nlogging: info\n",
        )],
    ));
    fetcher.route(
        "https://config.example.com/edge.yaml",
        200,
        "server:\n  hosts:\n    - b.example.com\n",
    );

    let doc = resolve(
        &resolver,
        &[
            config_map_entry("edge-base", "config.yaml"),
            web("https://config.example.com/edge.yaml", Vec::new()),
            literal("logging: debug\n"),
        ],
    )
    .await
    .unwrap();

    assert_eq!(text(&doc, &["logging"]), Some("debug"));
    assert_eq!(text(&doc, &["server", "worker_threads"]), Some("4"));
    let hosts: Vec<&str> = doc
        .lookup(&["server", "hosts"])
        .and_then(ConfigNode::as_sequence)
        .unwrap()
        .iter()
        .filter_map(ConfigNode::as_str)
        .collect();
    assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
}

#[tokio::test]
async fn test_identical_fragments_are_not_duplicated() {
    let (_store, _fetcher, resolver) = setup();
    let fragment = "server:\n  hosts:\n    - a.example.com\n";

    let doc = resolve(&resolver, &[literal(fragment), literal(fragment)])
        .await
        .unwrap();

    assert_eq!(
        doc.lookup(&["server", "hosts"])
            .and_then(ConfigNode::as_sequence)
            .map(<[ConfigNode]>::len),
        Some(1)
    );
}

#[tokio::test]
async fn test_web_headers_are_resolved_from_secrets() {
    let (store, fetcher, resolver) = setup();
    store.insert_secret(secret(NS, "web-creds", &[("token", "Bearer abc123")]));
    fetcher.route("https://config.example.com/edge.yaml", 200, "a: 1\n");

    resolve(
        &resolver,
        &[web(
            "https://config.example.com/edge.yaml",
            vec![
                HeaderEntry {
                    header_type: HeaderType::Secret,
                    name: "Authorization".into(),
                    value: "web-creds".into(),
                    secret_key: Some("token".into()),
                },
                HeaderEntry {
                    header_type: HeaderType::Literal,
                    name: "X-Tenant".into(),
                    value: "edge".into(),
                    secret_key: None,
                },
            ],
        )],
    )
    .await
    .unwrap();

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .headers
        .contains(&("Authorization".to_string(), "Bearer abc123".to_string())));
    assert!(requests[0]
        .headers
        .contains(&("X-Tenant".to_string(), "edge".to_string())));
}

#[tokio::test]
async fn test_non_success_status_fails_resolution() {
    let (_store, fetcher, resolver) = setup();
    fetcher.route("https://config.example.com/edge.yaml", 503, "unavailable");

    let err = resolve(
        &resolver,
        &[
            literal("a: 1\n"),
            web("https://config.example.com/edge.yaml", Vec::new()),
        ],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Fetch { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_missing_config_map_and_key_are_not_found() {
    let (store, _fetcher, resolver) = setup();

    let err = resolve(&resolver, &[config_map_entry("absent", "config.yaml")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");

    store.insert_config_map(config_map(NS, "edge-base", &[("other.yaml", "a: 1\n")]));
    let err = resolve(&resolver, &[config_map_entry("edge-base", "config.yaml")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_scalar_fragment_is_rejected() {
    let (_store, _fetcher, resolver) = setup();

    let err = resolve(&resolver, &[literal("just a string")])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Document { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_multiple_oidc_sources_fail_before_any_call() {
    let (store, fetcher, resolver) = setup();

    let sources = vec![
        sources_from_entries(&[oidc("first")]).unwrap().remove(0),
        sources_from_entries(&[oidc("second")]).unwrap().remove(0),
    ];
    let err = resolver.resolve(NS, &sources).await.unwrap_err();

    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    assert!(fetcher.requests().is_empty());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_registered_client_is_referenced_without_network_calls() {
    let (store, fetcher, resolver) = setup();
    store.insert_secret(secret(
        NS,
        "edge-oidc",
        &[("client_id", "abc"), ("client_secret", "s3cret")],
    ));

    let doc = resolve(
        &resolver,
        &[literal("identity:\n  oidc:\n    scopes: [openid]\n"), oidc("edge-oidc")],
    )
    .await
    .unwrap();

    assert!(fetcher.requests().is_empty());
    assert_eq!(
        text(&doc, &["identity", "oidc", "client_id"]),
        Some("secret:edge-oidc/client_id")
    );
    assert_eq!(
        text(&doc, &["identity", "oidc", "discovery_endpoint"]),
        Some("https://idp.example.com/.well-known/openid-configuration")
    );
    let yaml = doc.to_yaml().unwrap();
    assert!(!yaml.contains("s3cret"), "raw secret leaked: {yaml}");
}
