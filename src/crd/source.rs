//! # Configuration Source Entries
//!
//! Wire format of `spec.configuration[]`. The webhook decodes its annotation
//! grammar into the same entries, so both front-ends share one conversion
//! into [`crate::source::ConfigurationSource`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SourceType {
    /// Inline YAML document
    #[serde(rename = "literal")]
    Literal,
    /// Data key of a ConfigMap in the resource namespace
    #[serde(rename = "configmap")]
    ConfigMap,
    /// Document fetched over HTTP(S)
    #[serde(rename = "web")]
    Web,
    /// OIDC dynamic client registration
    #[serde(rename = "oidc_registration")]
    OidcRegistration,
}

impl SourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::ConfigMap => "configmap",
            Self::Web => "web",
            Self::OidcRegistration => "oidc_registration",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literal" => Ok(Self::Literal),
            "configmap" => Ok(Self::ConfigMap),
            "web" => Ok(Self::Web),
            "oidc_registration" => Ok(Self::OidcRegistration),
            other => Err(format!("unknown configuration type '{other}'")),
        }
    }
}

/// One entry of `spec.configuration[]`
///
/// Which fields are required depends on `type`:
/// - `literal`: `value`
/// - `configmap`: `name`, `dataKey`
/// - `web`: `url`, optional `headers`
/// - `oidc_registration`: `discoveryEndpoint`, `secret`, `postData`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationEntry {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_endpoint: Option<String>,
    /// Secret holding OIDC client credentials and registration auth material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_data: Vec<PostDataEntry>,
}

impl ConfigurationEntry {
    /// Entry of the given type with every optional field unset
    #[must_use]
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            name: None,
            data_key: None,
            url: None,
            headers: Vec::new(),
            value: None,
            discovery_endpoint: None,
            secret: None,
            post_data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum HeaderType {
    /// `value` is sent as-is
    #[serde(rename = "literal")]
    Literal,
    /// `value` names a Secret and `secretKey` the data key holding the header value
    #[serde(rename = "secret")]
    Secret,
}

impl FromStr for HeaderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literal" => Ok(Self::Literal),
            "secret" => Ok(Self::Secret),
            other => Err(format!("unknown header type '{other}'")),
        }
    }
}

/// HTTP header sent with a `web` source request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderEntry {
    #[serde(rename = "type")]
    pub header_type: HeaderType,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// Field of the OIDC client registration request body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PostDataEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}
