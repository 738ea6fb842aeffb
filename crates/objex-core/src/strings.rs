//! Deduplicated interned string storage.
//!
//! Mirrors the teacher's `intern.rs` interner: values are appended to a
//! vector and looked up by index to avoid repeated allocation/cloning of
//! labels, type names, and previews that recur constantly across a
//! million-object snapshot.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::ids::StrId;

/// Append-only table of interned byte strings.
///
/// The snapshot format stores labels, type names, and truncated previews as
/// indices into this table rather than inline, per `spec.md` §3 ("String
/// table. Deduplicated interned blob store... A string reference is a 32-bit
/// index"). `spec.md` §3 also notes "the string table is append-only within a
/// snapshot" — there is no removal path by design.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringTable {
    values: Vec<Vec<u8>>,
    #[serde(skip)]
    index: AHashMap<Vec<u8>, StrId>,
}

impl StringTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, returning its existing id if already present.
    pub fn intern(&mut self, value: impl AsRef<[u8]>) -> StrId {
        let bytes = value.as_ref();
        if let Some(&id) = self.index.get(bytes) {
            return id;
        }
        let id = StrId::new(u32::try_from(self.values.len()).expect("string table overflow"));
        self.values.push(bytes.to_vec());
        self.index.insert(bytes.to_vec(), id);
        id
    }

    #[must_use]
    pub fn get(&self, id: StrId) -> &[u8] {
        &self.values[id.index()]
    }

    #[must_use]
    pub fn get_str(&self, id: StrId) -> String {
        String::from_utf8_lossy(self.get(id)).into_owned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates `(id, bytes)` pairs for every entry from `start` onward, in
    /// insertion order. Used by the Snapshot Writer to flush only the
    /// entries interned since the last batch (`spec.md` §5: "the snapshot
    /// writer must not buffer unboundedly").
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (StrId, &[u8])> {
        self.values
            .iter()
            .enumerate()
            .skip(start)
            .map(|(i, v)| (StrId::new(u32::try_from(i).expect("string table overflow")), v.as_slice()))
    }

    /// Rebuilds the lookup index after deserializing raw `values`.
    ///
    /// The index is `#[serde(skip)]` (it's a derived structure keyed on
    /// owned bytes that would otherwise double the artifact's size); callers
    /// that load a `StringTable` from disk and intend to keep interning into
    /// it must call this first.
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, v) in self.values.iter().enumerate() {
            self.index
                .insert(v.clone(), StrId::new(u32::try_from(i).expect("string table overflow")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        let c = table.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn get_round_trips() {
        let mut table = StringTable::new();
        let id = table.intern("attr_name");
        assert_eq!(table.get_str(id), "attr_name");
    }
}
