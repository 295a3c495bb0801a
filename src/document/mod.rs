//! # Configuration Documents
//!
//! [`ConfigNode`] is the single recursive representation of a gateway
//! configuration document. It is produced directly by the YAML deserializer,
//! so every source (literal text, ConfigMap data, web responses) yields the
//! same shape and mapping keys are always strings.
//!
//! The merge rules live in [`merge`].

pub mod merge;

pub use merge::{fold, merge};

use crate::error::{Error, Result};
use serde::de::{self, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Leaf value of a configuration document
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_yaml::Number),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A node in a configuration document
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(Scalar),
    Mapping(BTreeMap<String, ConfigNode>),
    Sequence(Vec<ConfigNode>),
}

impl Default for ConfigNode {
    fn default() -> Self {
        Self::empty_mapping()
    }
}

impl ConfigNode {
    #[must_use]
    pub fn empty_mapping() -> Self {
        Self::Mapping(BTreeMap::new())
    }

    /// Parse a configuration fragment.
    ///
    /// Fragments are layered on top of each other, so the top level must be a
    /// mapping. An empty document counts as an empty mapping.
    pub fn parse_fragment(origin: &str, text: &str) -> Result<Self> {
        let node: Self = serde_yaml::from_str(text).map_err(|e| Error::Document {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

        match node {
            Self::Scalar(Scalar::Null) => Ok(Self::empty_mapping()),
            Self::Mapping(_) => Ok(node),
            _ => Err(Error::Document {
                origin: origin.to_string(),
                reason: "top level of a configuration fragment must be a mapping".to_string(),
            }),
        }
    }

    /// Render the document as YAML, the format consumed by the gateway runtime
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Document {
            origin: "merged document".to_string(),
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    #[must_use]
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            Self::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, ConfigNode>> {
        match self {
            Self::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&[ConfigNode]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up a child of a mapping node
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.as_mapping().and_then(|entries| entries.get(key))
    }

    /// Walk a path of mapping keys from this node
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<&ConfigNode> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Mutable variant of [`ConfigNode::lookup`]
    pub fn lookup_mut(&mut self, path: &[&str]) -> Option<&mut ConfigNode> {
        path.iter().try_fold(self, |node, key| {
            node.as_mapping_mut().and_then(|entries| entries.get_mut(*key))
        })
    }

    /// Normalize a scalar used as a mapping key into its string form
    fn into_key(self) -> Option<String> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            Self::Scalar(other) => Some(other.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for ConfigNode {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(Scalar::Null) => serializer.serialize_unit(),
            Self::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Self::Scalar(Scalar::Number(n)) => n.serialize(serializer),
            Self::Scalar(Scalar::String(s)) => serializer.serialize_str(s),
            Self::Mapping(entries) => entries.serialize(serializer),
            Self::Sequence(items) => serializer.collect_seq(items),
        }
    }
}

impl<'de> Deserialize<'de> for ConfigNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = ConfigNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Number(v.into())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Number(v.into())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Number(v.into())))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::string(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Null))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Null))
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<ConfigNode, D::Error> {
        ConfigNode::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<ConfigNode, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConfigNode::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<ConfigNode, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<ConfigNode, ConfigNode>()? {
            let key = key
                .into_key()
                .ok_or_else(|| de::Error::custom("mapping keys must be scalars"))?;
            entries.insert(key, value);
        }
        Ok(ConfigNode::Mapping(entries))
    }

    // Tagged values (`!tag value`) keep their value and drop the tag
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> std::result::Result<ConfigNode, A::Error> {
        let (_tag, variant): (String, _) = data.variant()?;
        variant.newtype_variant()
    }
}
