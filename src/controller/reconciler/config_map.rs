//! # Generated ConfigMap
//!
//! Keeps the ConfigMap holding a gateway's merged document in step with the
//! resolved configuration. The ConfigMap is created once with `generateName`
//! and afterwards updated in place.

use crate::constants::{CONFIG_DATA_KEY, CONFIG_MAP_LABEL, DEFAULT_CONFIG_MAP_SUFFIX};
use crate::crd::ApplicationGateway;
use crate::error::Result;
use crate::store::{ObjectStore, StoreResultExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Short digest identifying one rendering of the merged document
#[must_use]
pub fn config_version(document: &str) -> String {
    let digest = Sha256::digest(document.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// `generateName` prefix of the gateway's ConfigMap
#[must_use]
pub fn config_map_prefix(gateway: &ApplicationGateway) -> String {
    let suffix = gateway
        .spec
        .deployment
        .generated_config_map_suffix
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CONFIG_MAP_SUFFIX);
    format!("{}{suffix}", gateway.metadata.name.as_deref().unwrap_or_default())
}

#[must_use]
pub fn render_config_map(gateway: &ApplicationGateway, document: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            generate_name: Some(config_map_prefix(gateway)),
            namespace: gateway.metadata.namespace.clone(),
            labels: Some(BTreeMap::from([(
                "app".to_string(),
                gateway.metadata.name.clone().unwrap_or_default(),
            )])),
            owner_references: gateway.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CONFIG_DATA_KEY.to_string(),
            document.to_string(),
        )])),
        ..Default::default()
    }
}

/// Name of the ConfigMap currently serving this gateway, if known
fn current_name(gateway: &ApplicationGateway, live: Option<&Deployment>) -> Option<String> {
    live.and_then(|d| d.spec.as_ref())
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
        .and_then(|l| l.get(CONFIG_MAP_LABEL).cloned())
        .or_else(|| {
            gateway
                .status
                .as_ref()
                .and_then(|s| s.config_map_name.clone())
        })
        .filter(|n| !n.is_empty())
}

/// Generated ConfigMap serving a gateway after [`ensure_config_map`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedConfigMap {
    pub name: String,
    /// Version of the document it holds
    pub version: String,
    /// Created during this pass, so nothing references it yet
    pub created: bool,
}

/// Create or update the generated ConfigMap
pub async fn ensure_config_map(
    store: &dyn ObjectStore,
    gateway: &ApplicationGateway,
    live: Option<&Deployment>,
    document: &str,
) -> Result<GeneratedConfigMap> {
    let namespace = gateway.metadata.namespace.as_deref().unwrap_or_default();
    let version = config_version(document);

    let existing = match current_name(gateway, live) {
        Some(name) => store.get_config_map(namespace, &name).await.found()?,
        None => None,
    };

    let Some(mut config_map) = existing else {
        let created = store
            .create_config_map(namespace, &render_config_map(gateway, document))
            .await?;
        let name = created.metadata.name.unwrap_or_default();
        info!(config_map = name.as_str(), version = version.as_str(), "Created generated ConfigMap");
        return Ok(GeneratedConfigMap {
            name,
            version,
            created: true,
        });
    };

    let name = config_map.metadata.name.clone().unwrap_or_default();
    let data = config_map.data.get_or_insert_with(BTreeMap::new);
    if data.get(CONFIG_DATA_KEY).map(String::as_str) == Some(document) {
        debug!(config_map = name.as_str(), "Generated ConfigMap is up to date");
        return Ok(GeneratedConfigMap {
            name,
            version,
            created: false,
        });
    }

    data.insert(CONFIG_DATA_KEY.to_string(), document.to_string());
    store.replace_config_map(namespace, &config_map).await?;
    info!(config_map = name.as_str(), version = version.as_str(), "Updated generated ConfigMap");
    Ok(GeneratedConfigMap {
        name,
        version,
        created: false,
    })
}

/// Remove a ConfigMap created by a pass that failed before anything used it
pub async fn discard_config_map(store: &dyn ObjectStore, namespace: &str, name: &str) {
    match store.delete_config_map(namespace, name).await {
        Ok(()) => info!(config_map = name, "Deleted unused generated ConfigMap"),
        Err(e) if e.is_not_found() => debug!(config_map = name, "ConfigMap already gone"),
        Err(e) => warn!(config_map = name, error = %e, "Failed to delete unused generated ConfigMap"),
    }
}
