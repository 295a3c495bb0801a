//! # Config Source Resolver
//!
//! Turns an ordered source list into one merged [`ConfigNode`].
//!
//! Literal, ConfigMap and web sources are folded in list order. The OIDC
//! registration, if any, runs after all of them so that it can update an
//! existing `identity.oidc` mapping instead of adding a second one. Any error
//! aborts the resolution and no partial document is returned.

use super::{validate_sources, ConfigurationSource, OidcRegistration, WebHeader};
use crate::document::{merge, ConfigNode};
use crate::error::{Error, Result};
use crate::http::{HttpFetcher, HttpRequest};
use crate::observability::metrics;
use crate::oidc::{OidcClientProvisioner, CLIENT_ID_KEY, CLIENT_SECRET_KEY};
use crate::store::{secret_value, ObjectStore};
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

pub struct ConfigSourceResolver {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn HttpFetcher>,
    provisioner: OidcClientProvisioner,
}

impl std::fmt::Debug for ConfigSourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSourceResolver").finish_non_exhaustive()
    }
}

impl ConfigSourceResolver {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: Arc<dyn HttpFetcher>) -> Self {
        let provisioner = OidcClientProvisioner::new(store.clone(), fetcher.clone());
        Self {
            store,
            fetcher,
            provisioner,
        }
    }

    /// Resolve `sources` in `namespace` into the merged configuration document
    pub async fn resolve(
        &self,
        namespace: &str,
        sources: &[ConfigurationSource],
    ) -> Result<ConfigNode> {
        let span = info_span!(
            "config.resolve",
            resource.namespace = namespace,
            sources = sources.len()
        );

        async move {
            let result = self.resolve_all(namespace, sources).await;
            match &result {
                Ok(_) => metrics::increment_config_resolutions("success"),
                Err(e) => metrics::increment_config_resolutions(e.kind()),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn resolve_all(
        &self,
        namespace: &str,
        sources: &[ConfigurationSource],
    ) -> Result<ConfigNode> {
        validate_sources(sources)?;

        let mut document = ConfigNode::empty_mapping();
        let mut registration = None;

        for source in sources {
            let fragment = match source {
                ConfigurationSource::OidcRegistration(reg) => {
                    registration = Some(reg);
                    continue;
                }
                ConfigurationSource::Literal { value } => {
                    ConfigNode::parse_fragment(&source.describe(), value)?
                }
                ConfigurationSource::ConfigMapRef { name, data_key } => {
                    self.config_map_fragment(namespace, name, data_key).await?
                }
                ConfigurationSource::Web { url, headers } => {
                    self.web_fragment(namespace, url, headers).await?
                }
            };
            debug!(source = %source.describe(), "merging configuration fragment");
            document = merge(document, fragment);
        }

        if let Some(reg) = registration {
            self.provisioner.ensure_client(namespace, reg).await?;
            apply_identity(&mut document, reg);
        }

        Ok(document)
    }

    async fn config_map_fragment(
        &self,
        namespace: &str,
        name: &str,
        data_key: &str,
    ) -> Result<ConfigNode> {
        let config_map = self.store.get_config_map(namespace, name).await?;
        let text = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(data_key))
            .ok_or_else(|| Error::NotFound {
                kind: "ConfigMap key".to_string(),
                name: format!("{name}/{data_key}"),
            })?;
        ConfigNode::parse_fragment(&format!("configmap {name}/{data_key}"), text)
    }

    async fn web_fragment(
        &self,
        namespace: &str,
        url: &str,
        headers: &[WebHeader],
    ) -> Result<ConfigNode> {
        let mut request = HttpRequest::get(url);
        for header in headers {
            let (name, value) = match header {
                WebHeader::Literal { name, value } => (name.clone(), value.clone()),
                WebHeader::Secret {
                    name,
                    secret_name,
                    secret_key,
                } => {
                    let secret = self.store.get_secret(namespace, secret_name).await?;
                    let value =
                        secret_value(&secret, secret_key).ok_or_else(|| Error::NotFound {
                            kind: "Secret key".to_string(),
                            name: format!("{secret_name}/{secret_key}"),
                        })?;
                    (name.clone(), value)
                }
            };
            request = request.header(name, value);
        }

        let response = self.fetcher.execute(request).await?;
        if !response.is_success() {
            return Err(Error::fetch(
                url,
                format!("unexpected status {}", response.status),
            ));
        }
        ConfigNode::parse_fragment(&format!("web source {url}"), &response.body)
    }
}

/// Point `identity.oidc` at the registered client.
///
/// The credentials are secret references, never the raw values.
pub fn apply_identity(document: &mut ConfigNode, registration: &OidcRegistration) {
    let fields = [
        (
            "discovery_endpoint",
            registration.discovery_endpoint.clone(),
        ),
        (
            CLIENT_ID_KEY,
            format!("secret:{}/{CLIENT_ID_KEY}", registration.secret_name),
        ),
        (
            CLIENT_SECRET_KEY,
            format!("secret:{}/{CLIENT_SECRET_KEY}", registration.secret_name),
        ),
    ];

    if let Some(oidc) = document
        .lookup_mut(&["identity", "oidc"])
        .and_then(ConfigNode::as_mapping_mut)
    {
        for (key, value) in fields {
            oidc.insert(key.to_string(), ConfigNode::string(value));
        }
        return;
    }

    let oidc = ConfigNode::Mapping(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), ConfigNode::string(value)))
            .collect(),
    );
    let identity = ConfigNode::Mapping([("oidc".to_string(), oidc)].into_iter().collect());
    let fragment = ConfigNode::Mapping([("identity".to_string(), identity)].into_iter().collect());

    let current = std::mem::take(document);
    *document = merge(current, fragment);
}
