//! # Annotation Grammar
//!
//! Decodes the vendor-prefixed annotations of a Pod or Deployment into the
//! same [`ConfigurationEntry`] model the custom resource uses.
//!
//! ```text
//! app-gateway.operator.dev/deployment.image: gateway:24.12
//! app-gateway.operator.dev/service.port: "30112"
//! app-gateway.operator.dev/env.LANG: C
//! app-gateway.operator.dev/configuration.base.type: configmap
//! app-gateway.operator.dev/configuration.base.order: "1"
//! app-gateway.operator.dev/configuration.base.name: edge-base
//! app-gateway.operator.dev/configuration.base.dataKey: config.yaml
//! app-gateway.operator.dev/configuration.remote.header.auth.type: secret
//! app-gateway.operator.dev/configuration.oidc.postData.uris.values.0: https://...
//! ```

use crate::constants::{ANNOTATION_PREFIX, CONFIG_MAP_NAME_ANNOTATION, SERVICE_NAME_ANNOTATION};
use crate::crd::{ConfigurationEntry, HeaderEntry, HeaderType, PostDataEntry, SourceType};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

pub const CONFIGURATION_KEY: &str = "configuration.";
pub const ENV_KEY: &str = "env.";
pub const IMAGE_KEY: &str = "deployment.image";
pub const IMAGE_PULL_POLICY_KEY: &str = "deployment.imagePullPolicy";
pub const SERVICE_PORT_KEY: &str = "service.port";

/// Read-only view over the annotations of an admitted object
#[derive(Debug, Clone, Copy)]
pub struct GatewayAnnotations<'a> {
    all: &'a BTreeMap<String, String>,
}

impl<'a> GatewayAnnotations<'a> {
    #[must_use]
    pub fn new(all: &'a BTreeMap<String, String>) -> Self {
        Self { all }
    }

    /// Non-empty value of `<prefix><key>`
    fn vendor(&self, key: &str) -> Option<&'a str> {
        self.all
            .get(&format!("{ANNOTATION_PREFIX}{key}"))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Vendor keys with the prefix stripped
    fn vendor_entries(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.all.iter().filter_map(|(key, value)| {
            key.strip_prefix(ANNOTATION_PREFIX)
                .map(|short| (short, value.as_str()))
        })
    }

    #[must_use]
    pub fn has_vendor_keys(&self) -> bool {
        self.vendor_entries().next().is_some()
    }

    #[must_use]
    pub fn image(&self) -> Option<&'a str> {
        self.vendor(IMAGE_KEY)
    }

    #[must_use]
    pub fn image_pull_policy(&self) -> Option<&'a str> {
        self.vendor(IMAGE_PULL_POLICY_KEY)
    }

    #[must_use]
    pub fn service_port(&self) -> Option<&'a str> {
        self.vendor(SERVICE_PORT_KEY)
    }

    /// Service recorded by a previous admission
    #[must_use]
    pub fn service_name(&self) -> Option<&'a str> {
        self.all
            .get(SERVICE_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// ConfigMap recorded by a previous admission
    #[must_use]
    pub fn config_map_name(&self) -> Option<&'a str> {
        self.all
            .get(CONFIG_MAP_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `env.<name>` entries, ordered by name
    #[must_use]
    pub fn env(&self) -> Vec<(&'a str, &'a str)> {
        self.vendor_entries()
            .filter_map(|(key, value)| key.strip_prefix(ENV_KEY).map(|name| (name, value)))
            .filter(|(name, _)| !name.is_empty())
            .collect()
    }

    /// Checks run before any object is created: an image and a decodable
    /// configuration list are required
    pub fn validate(&self) -> Result<Vec<ConfigurationEntry>> {
        if self.image().is_none() {
            return Err(Error::validation("no gateway image has been specified"));
        }
        self.configuration()
    }

    /// Decode every `configuration.<name>.*` group, ordered by `.order`
    pub fn configuration(&self) -> Result<Vec<ConfigurationEntry>> {
        let mut groups: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
        for (key, value) in self.vendor_entries() {
            let Some(rest) = key.strip_prefix(CONFIGURATION_KEY) else {
                continue;
            };
            if let Some((name, field)) = rest.split_once('.') {
                groups.entry(name).or_default().insert(field, value);
            }
        }

        let mut ordered = Vec::with_capacity(groups.len());
        let mut oidc = 0;
        for (name, fields) in &groups {
            let (order, entry) = decode_entry(name, fields)?;
            if entry.source_type == SourceType::OidcRegistration {
                oidc += 1;
            }
            ordered.push((order, entry));
        }

        if oidc > 1 {
            return Err(Error::validation(
                "multiple OIDC sources configured; at most one oidc_registration entry is allowed",
            ));
        }
        if ordered.is_empty() {
            return Err(Error::validation(
                "no configuration entries specified in the annotations",
            ));
        }

        // Stable: equal orders keep name order
        ordered.sort_by_key(|(order, _)| *order);
        Ok(ordered.into_iter().map(|(_, entry)| entry).collect())
    }
}

fn decode_entry(name: &str, fields: &BTreeMap<&str, &str>) -> Result<(i64, ConfigurationEntry)> {
    let field = |key: &str| fields.get(key).map(|v| (*v).to_string());

    let source_type: SourceType = fields
        .get("type")
        .ok_or_else(|| Error::validation(format!("configuration entry '{name}' has no type")))?
        .parse()
        .map_err(Error::Validation)?;

    let raw_order = fields.get("order").copied().unwrap_or_default();
    let order = raw_order.trim().parse::<i64>().map_err(|_| {
        Error::validation(format!(
            "configuration entry '{name}' has an invalid order value '{raw_order}'"
        ))
    })?;

    let mut entry = ConfigurationEntry::new(source_type);
    match source_type {
        SourceType::Literal => entry.value = field("value"),
        SourceType::ConfigMap => {
            entry.name = field("name");
            entry.data_key = field("dataKey");
        }
        SourceType::Web => {
            entry.url = field("url");
            entry.headers = decode_headers(fields)?;
        }
        SourceType::OidcRegistration => {
            entry.discovery_endpoint = field("discoveryEndpoint");
            entry.secret = field("secret");
            entry.post_data = decode_post_data(fields);
        }
    }
    Ok((order, entry))
}

/// Names of the `<section>.<name>.*` sub-groups
fn sub_groups<'f>(fields: &BTreeMap<&'f str, &str>, section: &str) -> BTreeSet<&'f str> {
    fields
        .keys()
        .filter_map(|key| key.strip_prefix(section))
        .filter_map(|rest| rest.split('.').next())
        .filter(|name| !name.is_empty())
        .collect()
}

fn decode_headers(fields: &BTreeMap<&str, &str>) -> Result<Vec<HeaderEntry>> {
    let mut headers = Vec::new();
    for header in sub_groups(fields, "header.") {
        let get = |key: &str| fields.get(format!("header.{header}.{key}").as_str()).copied();

        // Headers without a type are ignored
        let header_type: HeaderType = match get("type").filter(|t| !t.is_empty()) {
            None => continue,
            Some(raw) => raw.parse().map_err(|_| {
                Error::validation(format!("configuration entry has an invalid header type '{raw}'"))
            })?,
        };

        headers.push(HeaderEntry {
            header_type,
            name: get("name").unwrap_or_default().to_string(),
            value: get("value").unwrap_or_default().to_string(),
            secret_key: get("secretKey").map(str::to_string),
        });
    }
    Ok(headers)
}

fn decode_post_data(fields: &BTreeMap<&str, &str>) -> Vec<PostDataEntry> {
    let mut post_data = Vec::new();
    for group in sub_groups(fields, "postData.") {
        let prefix = format!("postData.{group}.");
        let get = |key: &str| {
            fields
                .get(format!("{prefix}{key}").as_str())
                .copied()
                .filter(|v| !v.is_empty())
        };

        // Entries without a name are ignored
        let Some(name) = get("name") else {
            continue;
        };

        let mut values: Vec<(Option<u64>, &str, &str)> = fields
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(prefix.as_str())?.strip_prefix("values")?;
                match index {
                    "" => Some((None, *key, *value)),
                    _ => index
                        .strip_prefix('.')
                        .map(|n| (n.parse().ok(), *key, *value)),
                }
            })
            .collect();
        values.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let (value, values) = match get("value") {
            Some(value) => (Some(value.to_string()), None),
            None => (
                None,
                Some(values.into_iter().map(|(_, _, v)| v.to_string()).collect()),
            ),
        };

        post_data.push(PostDataEntry {
            name: name.to_string(),
            value,
            values,
        });
    }
    post_data
}

/// Vendor keys whose value differs between the live and incoming object.
///
/// A key missing from either side counts as changed. `env.*` is ignored on
/// Pods, whose environment cannot be changed in place.
#[must_use]
pub fn changed_keys(
    incoming: &BTreeMap<String, String>,
    live: &BTreeMap<String, String>,
    is_pod: bool,
) -> Vec<String> {
    let keys: BTreeSet<&String> = incoming
        .keys()
        .chain(live.keys())
        .filter(|key| key.starts_with(ANNOTATION_PREFIX))
        .collect();

    keys.into_iter()
        .filter(|key| !(is_pod && key[ANNOTATION_PREFIX.len()..].starts_with(ENV_KEY)))
        .filter(|key| incoming.get(*key) != live.get(*key))
        .cloned()
        .collect()
}

/// Whether the admitted object needs a sidecar patch.
///
/// On create any vendor annotation is enough. On update a changed key must
/// touch the image, the configuration, the service port or the environment.
#[must_use]
pub fn mutation_required(
    incoming: &BTreeMap<String, String>,
    live: Option<&BTreeMap<String, String>>,
    is_pod: bool,
) -> bool {
    match live {
        None => GatewayAnnotations::new(incoming).has_vendor_keys(),
        Some(live) => changed_keys(incoming, live, is_pod)
            .iter()
            .any(|key| UpdateScope::classify(key).is_some()),
    }
}

/// Sub-resources an update has to recompute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateScope {
    pub service: bool,
    pub config: bool,
    pub container: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Implicated {
    Service,
    Config,
    Container,
}

impl UpdateScope {
    fn classify(key: &str) -> Option<Implicated> {
        let short = key.strip_prefix(ANNOTATION_PREFIX)?;
        if short.starts_with(CONFIGURATION_KEY) {
            Some(Implicated::Config)
        } else if short.starts_with(SERVICE_PORT_KEY) {
            Some(Implicated::Service)
        } else if short.starts_with(IMAGE_KEY) || short.starts_with(ENV_KEY) {
            Some(Implicated::Container)
        } else {
            None
        }
    }

    /// A configuration change also moves the container to the new ConfigMap
    #[must_use]
    pub fn from_changes(changed: &[String]) -> Self {
        let mut scope = Self::default();
        for implicated in changed.iter().filter_map(|key| Self::classify(key)) {
            match implicated {
                Implicated::Service => scope.service = true,
                Implicated::Config => {
                    scope.config = true;
                    scope.container = true;
                }
                Implicated::Container => scope.container = true,
            }
        }
        scope
    }
}
