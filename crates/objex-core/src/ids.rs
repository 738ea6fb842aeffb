//! Dense integer identifiers used throughout the snapshot tables.
//!
//! Every table in `spec.md` §3 keys its rows by a small integer rather than a
//! pointer, so that the reverse-edge index in the Analysis Indexer can be
//! built by sorting a flat array instead of chasing back-pointers (see
//! `spec.md` §9, "Cyclic object graphs").

use serde::{Deserialize, Serialize};

/// Identity of a captured object within one snapshot.
///
/// This is the node table's primary key. It is allocated densely during the
/// traversal walk (`NodeId(0)`, `NodeId(1)`, ...) and is unrelated to the
/// object's address in the source runtime; the address is preserved
/// separately as `Node::origin_addr` for operator-facing display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> u64 {
        self.0
    }
}

/// Identity of a type row. Types are also nodes (`spec.md` §3: "a reference
/// to the node that represents the type object itself"); `TypeId` and
/// `NodeId` are deliberately distinct newtypes so the indexer's
/// `type_id -> [object_id]` map can't be confused with the reverse-edge map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Index into the deduplicated string table (`spec.md` §3, "String table").
///
/// Kept at 32 bits per the spec ("A string reference is a 32-bit index").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StrId(u32);

impl StrId {
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
