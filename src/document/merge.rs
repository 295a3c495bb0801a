//! # Recursive Merge
//!
//! Layering rules for configuration documents. For every key of the overlay:
//!
//! - absent in the base: inserted
//! - both mappings: merged recursively
//! - both sequences: base items followed by overlay items, no dedup
//! - anything else: the overlay value wins
//!
//! Deep-equal values are left untouched. An ordered source list resolves to
//! [`fold`], a left fold of [`merge`] starting from an empty mapping.

use super::ConfigNode;

/// Merge `overlay` on top of `base`
#[must_use]
pub fn merge(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    if base == overlay {
        return base;
    }

    match (base, overlay) {
        (ConfigNode::Mapping(mut base), ConfigNode::Mapping(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            ConfigNode::Mapping(base)
        }
        (ConfigNode::Sequence(mut base), ConfigNode::Sequence(overlay)) => {
            base.extend(overlay);
            ConfigNode::Sequence(base)
        }
        (_, overlay) => overlay,
    }
}

/// Left fold of [`merge`] over ordered fragments
#[must_use]
pub fn fold<I>(fragments: I) -> ConfigNode
where
    I: IntoIterator<Item = ConfigNode>,
{
    fragments
        .into_iter()
        .fold(ConfigNode::empty_mapping(), merge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> ConfigNode {
        ConfigNode::parse_fragment("test", text).unwrap()
    }

    #[test]
    fn test_merge_disjoint_keys_is_union() {
        let merged = merge(doc("a: 1\nb: two"), doc("c: [x]\nd: {e: f}"));
        assert_eq!(merged, doc("a: 1\nb: two\nc: [x]\nd: {e: f}"));
    }

    #[test]
    fn test_merge_shared_scalar_overlay_wins() {
        let merged = merge(doc("a: 1\nb: keep"), doc("a: 2"));
        assert_eq!(merged, doc("a: 2\nb: keep"));
    }

    #[test]
    fn test_merge_sequences_concatenate_base_first() {
        let merged = merge(doc("list: [x, y]"), doc("list: [z]"));
        let items = merged.get("list").and_then(ConfigNode::as_sequence).unwrap();
        assert_eq!(items.len(), 3, "sequence lengths should add up");
        assert_eq!(merged, doc("list: [x, y, z]"));
    }

    #[test]
    fn test_merge_nested_mappings_recurse() {
        let merged = merge(
            doc("server:\n  port: 80\n  tls: {enabled: false}"),
            doc("server:\n  tls: {enabled: true, cert: c}"),
        );
        assert_eq!(
            merged,
            doc("server:\n  port: 80\n  tls: {enabled: true, cert: c}")
        );
    }

    #[test]
    fn test_merge_type_mismatch_overlay_wins() {
        assert_eq!(merge(doc("a: [1, 2]"), doc("a: {b: c}")), doc("a: {b: c}"));
        assert_eq!(merge(doc("a: {b: c}"), doc("a: scalar")), doc("a: scalar"));
        assert_eq!(merge(doc("a: scalar"), doc("a: [1]")), doc("a: [1]"));
    }

    #[test]
    fn test_merge_equal_values_are_untouched() {
        let merged = merge(doc("list: [x]\nname: gw"), doc("list: [x]\nname: gw"));
        assert_eq!(merged, doc("list: [x]\nname: gw"));
    }

    #[test]
    fn test_fold_matches_nested_merge() {
        let a = doc("a: 1\nlist: [x]\nnested: {k: v}");
        let b = doc("a: 2\nlist: [y]\nnested: {k2: v2}");
        let c = doc("b: 3\nlist: [z]\nnested: {k: w}");

        let folded = fold(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(folded, merge(merge(a, b), c));
    }

    #[test]
    fn test_fold_of_nothing_is_empty_mapping() {
        assert_eq!(fold(Vec::new()), ConfigNode::empty_mapping());
    }
}
