//! The shape adapter: per-classification enumeration of outbound references
//! (`spec.md` §4.1, step 2).

use crate::runtime::{DictKey, ObjectData, ObjectId, Runtime};

/// An outbound reference in the adapter's own vocabulary, before string
/// labels are interned into the snapshot's [`crate::strings::StringTable`]
/// by the traversal engine.
pub enum ShapeEdge {
    /// A well-known, compile-time-known attribute name.
    Attr(&'static str, ObjectId),
    /// An attribute/slot name only known at traversal time (e.g. `f"__closure__[{i}]"`).
    NamedAttr(String, ObjectId),
    /// A mapping key whose textual representation is the label.
    Key(String, ObjectId),
    /// A sequence position.
    Index(u64, ObjectId),
    /// Unlabeled set membership.
    Member(ObjectId),
}

/// Maximum length for a dict key's textual representation before it's
/// treated as "ambiguous" and truncated (`spec.md` §4.1, "Edge-label policy
/// for mapping keys").
const MAX_LITERAL_KEY_LEN: usize = 64;

/// A short, human-readable stand-in for `repr(key)` used to label dict
/// edges whose key is itself a tracked object (`spec.md` §4.1 scenario 5:
/// `outbound(D)` includes `(repr(K), V)`).
///
/// This is deliberately not a full Python-style `repr`: the spec only
/// requires the label be "short... and unambiguous" for literal keys, and a
/// best-effort preview otherwise.
fn preview_repr(runtime: &dyn Runtime, id: ObjectId) -> String {
    match runtime.get(id) {
        ObjectData::Str { value } => value.clone(),
        ObjectData::Int { value } => value.to_string(),
        ObjectData::Float { value } => value.to_string(),
        ObjectData::Bytes { value } => format!("b'{}'", String::from_utf8_lossy(value)),
        other => format!("<{}#{}>", other.own_classification().as_str(), id.index()),
    }
}

fn clamp_literal(text: &str) -> String {
    if text.len() <= MAX_LITERAL_KEY_LEN {
        text.to_owned()
    } else {
        let mut truncated: String = text.chars().take(MAX_LITERAL_KEY_LEN).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

/// Enumerates `id`'s outbound references per `spec.md` §4.1 item 2.
///
/// Dispatches purely on the [`ObjectData`] variant; the emitted order within
/// one node is the shape's natural order (insertion order for mappings,
/// positional order for sequences), matching the "Ordering and tie-breaks"
/// rule. `runtime` is consulted only to compute a textual preview for
/// object-valued dict keys.
pub fn outbound(runtime: &dyn Runtime, data: &ObjectData) -> Vec<ShapeEdge> {
    match data {
        ObjectData::Dict { entries } => entries
            .iter()
            .flat_map(|(key, value)| match key {
                DictKey::Literal(text) => vec![ShapeEdge::Key(clamp_literal(text), *value)],
                DictKey::Object(key_id) => vec![
                    ShapeEdge::Attr("<key>", *key_id),
                    ShapeEdge::Key(clamp_literal(&preview_repr(runtime, *key_id)), *value),
                ],
            })
            .collect(),
        ObjectData::List { items } | ObjectData::Tuple { items } => items
            .iter()
            .enumerate()
            .map(|(i, id)| ShapeEdge::Index(i as u64, *id))
            .collect(),
        ObjectData::Set { items } => items.iter().map(|id| ShapeEdge::Member(*id)).collect(),
        ObjectData::Frame { locals, globals, f_back } => {
            let mut edges = vec![ShapeEdge::Attr("f_locals", *locals), ShapeEdge::Attr("f_globals", *globals)];
            if let Some(back) = f_back {
                edges.push(ShapeEdge::Attr("f_back", *back));
            }
            edges
        }
        ObjectData::Module { dict, .. } => vec![ShapeEdge::Attr("__dict__", *dict)],
        ObjectData::Function {
            module,
            defaults,
            closure,
            code,
            dict,
            ..
        } => {
            let mut edges = Vec::new();
            if let Some(m) = module {
                edges.push(ShapeEdge::Attr("__module__", *m));
            }
            if let Some(c) = code {
                edges.push(ShapeEdge::Attr("__code__", *c));
            }
            for (i, d) in defaults.iter().enumerate() {
                edges.push(ShapeEdge::NamedAttr(format!("__defaults__[{i}]"), *d));
            }
            for (i, c) in closure.iter().enumerate() {
                edges.push(ShapeEdge::NamedAttr(format!("__closure__[{i}]"), *c));
            }
            if let Some(d) = dict {
                edges.push(ShapeEdge::Attr("__dict__", *d));
            }
            edges
        }
        ObjectData::Code { .. } => Vec::new(),
        ObjectData::Type { dict, mro, .. } => {
            let mut edges = vec![ShapeEdge::Attr("__dict__", *dict)];
            for (i, base) in mro.iter().enumerate() {
                edges.push(ShapeEdge::NamedAttr(format!("__mro__[{i}]"), *base));
            }
            edges
        }
        ObjectData::UserInstance { dict, slots } => {
            let mut edges = Vec::new();
            if let Some(d) = dict {
                edges.push(ShapeEdge::Attr("__dict__", *d));
            }
            for (i, slot) in slots.iter().enumerate() {
                edges.push(ShapeEdge::NamedAttr(format!("__slot__[{i}]"), *slot));
            }
            edges
        }
        ObjectData::OtherBuiltin { referents, .. } => referents
            .iter()
            .map(|r| ShapeEdge::NamedAttr(r.token.clone(), r.target))
            .collect(),
        ObjectData::Str { .. } | ObjectData::Bytes { .. } | ObjectData::Int { .. } | ObjectData::Float { .. } => {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::heap::HeapBuilder;
    use crate::model::Classification;

    #[test]
    fn clamp_literal_truncates_long_keys_with_an_ellipsis() {
        let short = "a".repeat(MAX_LITERAL_KEY_LEN);
        assert_eq!(clamp_literal(&short), short);

        let long = "a".repeat(MAX_LITERAL_KEY_LEN + 10);
        let clamped = clamp_literal(&long);
        assert_eq!(clamped.chars().count(), MAX_LITERAL_KEY_LEN + 1);
        assert!(clamped.ends_with('\u{2026}'));
    }

    #[test]
    fn object_valued_dict_key_emits_key_sentinel_then_repr_edge() {
        let mut builder = HeapBuilder::new();
        let key = builder.str("config");
        let value = builder.int(1);
        let dict = builder.alloc_builtin(
            Classification::Dict,
            ObjectData::Dict { entries: vec![(DictKey::Object(key), value)] },
        );
        let heap = builder.build();

        let edges = outbound(&heap, heap.get(dict));
        assert_eq!(edges.len(), 2);
        assert!(matches!(&edges[0], ShapeEdge::Attr("<key>", target) if *target == key));
        assert!(matches!(&edges[1], ShapeEdge::Key(text, target) if text == "config" && *target == value));
    }

    #[test]
    fn list_items_are_indexed_in_positional_order() {
        let mut builder = HeapBuilder::new();
        let a = builder.int(1);
        let b = builder.int(2);
        let list = builder.alloc_builtin(Classification::List, ObjectData::List { items: vec![a, b] });
        let heap = builder.build();

        let edges = outbound(&heap, heap.get(list));
        assert!(matches!(&edges[0], ShapeEdge::Index(0, target) if *target == a));
        assert!(matches!(&edges[1], ShapeEdge::Index(1, target) if *target == b));
    }
}
