//! # Patch Builder
//!
//! Typed construction of the RFC6902 patch returned in an admission response.
//! Array targets are tracked so that the first element is added as a whole
//! array and later ones are appended with `/-`.

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PatchBuilder {
    /// Pointer to the pod spec parent (`/spec/template` or the root)
    base: Vec<String>,
    operations: Vec<PatchOperation>,
}

impl PatchBuilder {
    #[must_use]
    pub fn new(base: &[&str]) -> Self {
        Self {
            base: base.iter().map(|t| (*t).to_string()).collect(),
            operations: Vec::new(),
        }
    }

    fn pointer(&self, tokens: &[&str]) -> PointerBuf {
        PointerBuf::from_tokens(
            self.base
                .iter()
                .map(String::as_str)
                .chain(tokens.iter().copied()),
        )
    }

    /// Add `value` to the array at `array`, which currently holds `current_len` items
    pub fn append(&mut self, array: &[&str], current_len: usize, value: Value) -> &mut Self {
        let operation = if current_len == 0 {
            AddOperation {
                path: self.pointer(array),
                value: Value::Array(vec![value]),
            }
        } else {
            let mut tokens = array.to_vec();
            tokens.push("-");
            AddOperation {
                path: self.pointer(&tokens),
                value,
            }
        };
        self.operations.push(PatchOperation::Add(operation));
        self
    }

    /// Replace the element at `index` of the array at `array`
    pub fn replace_at(&mut self, array: &[&str], index: usize, value: Value) -> &mut Self {
        let index = index.to_string();
        let mut tokens = array.to_vec();
        tokens.push(index.as_str());
        let path = self.pointer(&tokens);
        self.operations
            .push(PatchOperation::Replace(ReplaceOperation { path, value }));
        self
    }

    /// Replace the element at `index` if known, append otherwise
    pub fn upsert(
        &mut self,
        array: &[&str],
        index: Option<usize>,
        current_len: usize,
        value: Value,
    ) -> &mut Self {
        match index {
            Some(index) => self.replace_at(array, index, value),
            None => self.append(array, current_len, value),
        }
    }

    /// Write the full object annotation map with `updates` applied.
    ///
    /// Empty update values delete the key. The map is always written at
    /// `/metadata/annotations`, independent of the base.
    pub fn set_annotations(
        &mut self,
        current: Option<&BTreeMap<String, String>>,
        updates: &BTreeMap<String, String>,
    ) -> &mut Self {
        let mut merged = current.cloned().unwrap_or_default();
        for (key, value) in updates {
            if value.is_empty() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }

        let path = PointerBuf::from_tokens(["metadata", "annotations"]);
        let value = Value::Object(
            merged
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        );
        self.operations.push(match current {
            Some(_) => PatchOperation::Replace(ReplaceOperation { path, value }),
            None => PatchOperation::Add(AddOperation { path, value }),
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn build(self) -> Patch {
        Patch(self.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(builder: PatchBuilder) -> Value {
        serde_json::to_value(builder.build()).unwrap()
    }

    #[test]
    fn test_first_element_is_added_as_array() {
        let mut builder = PatchBuilder::new(&["spec", "template"]);
        builder.append(&["spec", "volumes"], 0, json!({"name": "cfg"}));

        assert_eq!(
            ops(builder),
            json!([{"op": "add", "path": "/spec/template/spec/volumes", "value": [{"name": "cfg"}]}])
        );
    }

    #[test]
    fn test_later_elements_are_appended() {
        let mut builder = PatchBuilder::new(&[]);
        builder.append(&["spec", "volumes"], 1, json!({"name": "cfg"}));

        assert_eq!(
            ops(builder),
            json!([{"op": "add", "path": "/spec/volumes/-", "value": {"name": "cfg"}}])
        );
    }

    #[test]
    fn test_upsert_replaces_known_index() {
        let mut builder = PatchBuilder::new(&[]);
        builder.upsert(&["spec", "containers"], Some(2), 3, json!({"name": "gw"}));

        assert_eq!(
            ops(builder),
            json!([{"op": "replace", "path": "/spec/containers/2", "value": {"name": "gw"}}])
        );
    }

    #[test]
    fn test_annotations_are_added_or_replaced() {
        let updates = BTreeMap::from([
            ("svc".to_string(), String::new()),
            ("cm".to_string(), "edge-cm".to_string()),
        ]);

        let mut builder = PatchBuilder::new(&["spec", "template"]);
        builder.set_annotations(None, &updates);
        assert_eq!(
            ops(builder),
            json!([{"op": "add", "path": "/metadata/annotations", "value": {"cm": "edge-cm"}}])
        );

        let current = BTreeMap::from([
            ("svc".to_string(), "old".to_string()),
            ("team".to_string(), "edge".to_string()),
        ]);
        let mut builder = PatchBuilder::new(&[]);
        builder.set_annotations(Some(&current), &updates);
        assert_eq!(
            ops(builder),
            json!([{"op": "replace", "path": "/metadata/annotations", "value": {"cm": "edge-cm", "team": "edge"}}])
        );
    }
}
