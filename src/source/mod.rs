//! # Configuration Sources
//!
//! Validated, closed model of the places a gateway configuration fragment can
//! come from. Entries from the custom resource or from decoded webhook
//! annotations are converted through [`ConfigurationSource::try_from`], which
//! checks the required fields of each variant up front so resolution never
//! starts with an incomplete source.

pub mod resolver;

pub use resolver::ConfigSourceResolver;

use crate::crd::{ConfigurationEntry, HeaderEntry, HeaderType, PostDataEntry, SourceType};
use crate::error::{Error, Result};

/// A single configuration source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationSource {
    /// Inline YAML document
    Literal { value: String },
    /// `data_key` of the ConfigMap `name` in the resource namespace
    ConfigMapRef { name: String, data_key: String },
    /// Document fetched with a GET request
    Web { url: String, headers: Vec<WebHeader> },
    /// OIDC dynamic client registration, always resolved last
    OidcRegistration(OidcRegistration),
}

impl ConfigurationSource {
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Literal { .. } => SourceType::Literal,
            Self::ConfigMapRef { .. } => SourceType::ConfigMap,
            Self::Web { .. } => SourceType::Web,
            Self::OidcRegistration(_) => SourceType::OidcRegistration,
        }
    }

    /// Human readable origin used in errors and logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Literal { .. } => "literal value".to_string(),
            Self::ConfigMapRef { name, data_key } => format!("configmap {name}/{data_key}"),
            Self::Web { url, .. } => format!("web source {url}"),
            Self::OidcRegistration(reg) => {
                format!("oidc registration {}", reg.discovery_endpoint)
            }
        }
    }

    /// Name of the ConfigMap this source reads, if any
    #[must_use]
    pub fn config_map_name(&self) -> Option<&str> {
        match self {
            Self::ConfigMapRef { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Header attached to a web source request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebHeader {
    Literal {
        name: String,
        value: String,
    },
    /// Value read from `secret_key` of the Secret `secret_name`
    Secret {
        name: String,
        secret_name: String,
        secret_key: String,
    },
}

/// OIDC client registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcRegistration {
    pub discovery_endpoint: String,
    /// Secret holding the client credentials and registration auth material
    pub secret_name: String,
    pub post_data: Vec<PostDataField>,
}

impl OidcRegistration {
    /// Scopes requested when a registration token has to be acquired.
    ///
    /// Taken from the post data field named `scopes`; every comma separated
    /// item is trimmed and quoted.
    #[must_use]
    pub fn token_scopes(&self) -> Option<String> {
        let field = self.post_data.iter().find(|f| f.name == "scopes")?;
        let raw: Vec<&str> = match &field.value {
            PostDataValue::Single(value) => value.split(',').collect(),
            PostDataValue::Multiple(values) => {
                values.iter().flat_map(|v| v.split(',')).collect()
            }
        };

        let quoted: Vec<String> = raw
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("\"{}\"", s.trim_matches('"')))
            .collect();

        (!quoted.is_empty()).then(|| quoted.join(","))
    }

    /// JSON body of the registration request
    #[must_use]
    pub fn registration_body(&self) -> serde_json::Value {
        let body: serde_json::Map<String, serde_json::Value> = self
            .post_data
            .iter()
            .map(|field| {
                let value = match &field.value {
                    PostDataValue::Single(v) => serde_json::Value::String(v.clone()),
                    PostDataValue::Multiple(vs) => serde_json::Value::from(vs.clone()),
                };
                (field.name.clone(), value)
            })
            .collect();
        serde_json::Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDataField {
    pub name: String,
    pub value: PostDataValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostDataValue {
    Single(String),
    Multiple(Vec<String>),
}

/// Reject source lists that can never resolve.
///
/// Runs before any network call or object store access.
pub fn validate_sources(sources: &[ConfigurationSource]) -> Result<()> {
    let oidc = sources
        .iter()
        .filter(|s| matches!(s, ConfigurationSource::OidcRegistration(_)))
        .count();
    if oidc > 1 {
        return Err(Error::validation(format!(
            "multiple OIDC sources configured ({oidc}); at most one oidc_registration entry is allowed"
        )));
    }
    Ok(())
}

/// Convert every entry, failing on the first invalid one
pub fn sources_from_entries(entries: &[ConfigurationEntry]) -> Result<Vec<ConfigurationSource>> {
    let sources = entries
        .iter()
        .map(ConfigurationSource::try_from)
        .collect::<Result<Vec<_>>>()?;
    validate_sources(&sources)?;
    Ok(sources)
}

fn required(value: Option<&String>, field: &str, source_type: SourceType) -> Result<String> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::validation(format!(
            "{source_type} configuration entry requires '{field}'"
        ))),
    }
}

impl TryFrom<&ConfigurationEntry> for ConfigurationSource {
    type Error = Error;

    fn try_from(entry: &ConfigurationEntry) -> Result<Self> {
        let ty = entry.source_type;
        match ty {
            SourceType::Literal => {
                // Empty literals are allowed and resolve to an empty mapping
                let value = entry.value.clone().ok_or_else(|| {
                    Error::validation("literal configuration entry requires 'value'")
                })?;
                Ok(Self::Literal { value })
            }
            SourceType::ConfigMap => Ok(Self::ConfigMapRef {
                name: required(entry.name.as_ref(), "name", ty)?,
                data_key: required(entry.data_key.as_ref(), "dataKey", ty)?,
            }),
            SourceType::Web => Ok(Self::Web {
                url: required(entry.url.as_ref(), "url", ty)?,
                headers: entry
                    .headers
                    .iter()
                    .map(WebHeader::try_from)
                    .collect::<Result<_>>()?,
            }),
            SourceType::OidcRegistration => Ok(Self::OidcRegistration(OidcRegistration {
                discovery_endpoint: required(
                    entry.discovery_endpoint.as_ref(),
                    "discoveryEndpoint",
                    ty,
                )?,
                secret_name: required(entry.secret.as_ref(), "secret", ty)?,
                post_data: entry
                    .post_data
                    .iter()
                    .map(PostDataField::try_from)
                    .collect::<Result<_>>()?,
            })),
        }
    }
}

impl TryFrom<&HeaderEntry> for WebHeader {
    type Error = Error;

    fn try_from(header: &HeaderEntry) -> Result<Self> {
        if header.name.trim().is_empty() || header.value.trim().is_empty() {
            return Err(Error::validation(
                "web header requires both 'name' and 'value'",
            ));
        }
        match header.header_type {
            HeaderType::Literal => Ok(Self::Literal {
                name: header.name.clone(),
                value: header.value.clone(),
            }),
            HeaderType::Secret => {
                let secret_key = header
                    .secret_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        Error::validation(format!(
                            "secret header '{}' requires 'secretKey'",
                            header.name
                        ))
                    })?;
                Ok(Self::Secret {
                    name: header.name.clone(),
                    secret_name: header.value.clone(),
                    secret_key,
                })
            }
        }
    }
}

impl TryFrom<&PostDataEntry> for PostDataField {
    type Error = Error;

    fn try_from(entry: &PostDataEntry) -> Result<Self> {
        if entry.name.trim().is_empty() {
            return Err(Error::validation("post data entry requires 'name'"));
        }
        let value = match (&entry.value, &entry.values) {
            (Some(value), _) => PostDataValue::Single(value.clone()),
            (None, Some(values)) if !values.is_empty() => PostDataValue::Multiple(values.clone()),
            _ => {
                return Err(Error::validation(format!(
                    "post data entry '{}' requires 'value' or 'values'",
                    entry.name
                )))
            }
        };
        Ok(Self {
            name: entry.name.clone(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oidc_entry() -> ConfigurationEntry {
        ConfigurationEntry {
            discovery_endpoint: Some("https://idp.example.com/.well-known/openid-configuration".into()),
            secret: Some("oidc-client".into()),
            post_data: vec![
                PostDataEntry {
                    name: "client_name".into(),
                    value: Some("gateway".into()),
                    values: None,
                },
                PostDataEntry {
                    name: "redirect_uris".into(),
                    value: None,
                    values: Some(vec!["https://gw/a".into(), "https://gw/b".into()]),
                },
                PostDataEntry {
                    name: "scopes".into(),
                    value: Some("openid, profile ,email".into()),
                    values: None,
                },
            ],
            ..ConfigurationEntry::new(SourceType::OidcRegistration)
        }
    }

    #[test]
    fn test_configmap_entry_requires_name_and_data_key() {
        let mut entry = ConfigurationEntry::new(SourceType::ConfigMap);
        entry.name = Some("base".into());
        let err = ConfigurationSource::try_from(&entry).unwrap_err();
        assert!(err.to_string().contains("dataKey"), "unexpected error: {err}");

        entry.data_key = Some("config.yaml".into());
        assert_eq!(
            ConfigurationSource::try_from(&entry).unwrap(),
            ConfigurationSource::ConfigMapRef {
                name: "base".into(),
                data_key: "config.yaml".into()
            }
        );
    }

    #[test]
    fn test_secret_header_requires_secret_key() {
        let header = HeaderEntry {
            header_type: HeaderType::Secret,
            name: "Authorization".into(),
            value: "web-creds".into(),
            secret_key: None,
        };
        assert!(matches!(
            WebHeader::try_from(&header),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_post_data_requires_value_or_values() {
        let entry = PostDataEntry {
            name: "client_name".into(),
            value: None,
            values: None,
        };
        let err = PostDataField::try_from(&entry).unwrap_err();
        assert!(err.to_string().contains("client_name"));
    }

    #[test]
    fn test_validate_sources_rejects_multiple_oidc() {
        let entries = vec![oidc_entry(), oidc_entry()];
        let err = sources_from_entries(&entries).unwrap_err();
        assert!(
            err.to_string().contains("multiple OIDC sources"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_token_scopes_are_trimmed_and_quoted() {
        let ConfigurationSource::OidcRegistration(reg) =
            ConfigurationSource::try_from(&oidc_entry()).unwrap()
        else {
            panic!("expected an oidc registration");
        };
        assert_eq!(
            reg.token_scopes().as_deref(),
            Some(r#""openid","profile","email""#)
        );
    }

    #[test]
    fn test_registration_body_keeps_value_shapes() {
        let ConfigurationSource::OidcRegistration(reg) =
            ConfigurationSource::try_from(&oidc_entry()).unwrap()
        else {
            panic!("expected an oidc registration");
        };
        let body = reg.registration_body();
        assert_eq!(body["client_name"], "gateway");
        assert_eq!(
            body["redirect_uris"],
            serde_json::json!(["https://gw/a", "https://gw/b"])
        );
    }
}
