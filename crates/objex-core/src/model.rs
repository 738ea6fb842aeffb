//! The snapshot data model: `spec.md` §3 (Node, Type, Edge, root set) given
//! concrete Rust representations.

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, StrId, TypeId};

/// Classification tag drawn from the closed set in `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Classification {
    Module,
    Frame,
    Function,
    Code,
    Type,
    Dict,
    List,
    Tuple,
    Set,
    String,
    Bytes,
    Int,
    Float,
    OtherBuiltin,
    UserInstance,
}

impl Classification {
    /// Whether nodes of this classification are part of the root set
    /// (`spec.md` §3: "The subset of nodes classified as `module` or
    /// `frame`").
    #[must_use]
    pub fn is_root(self) -> bool {
        matches!(self, Self::Module | Self::Frame)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Frame => "frame",
            Self::Function => "function",
            Self::Code => "code",
            Self::Type => "type",
            Self::Dict => "dict",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Set => "set",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Int => "int",
            Self::Float => "float",
            Self::OtherBuiltin => "other-builtin",
            Self::UserInstance => "user-instance",
        }
    }
}

/// A captured object (`spec.md` §3, "Node").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub type_id: TypeId,
    /// Byte size as observed during capture.
    pub size: u64,
    /// Reference count as observed during capture. Informational only —
    /// `spec.md` §3 is explicit that this is "not an invariant of edge
    /// counts (there are untracked holders)".
    pub refcount: u64,
    /// Length for sized containers (list/dict/set/tuple/str/bytes).
    pub len: Option<u64>,
    /// Truncated textual preview, present for string-like and user-instance
    /// nodes per `spec.md` §4.1 item 1.
    pub preview: Option<StrId>,
    /// The object's address in the source runtime at capture time, kept for
    /// operator-facing display; carries no meaning across snapshots.
    pub origin_addr: u64,
    /// Set when the shape adapter raised while enumerating this node's
    /// outbound references (`spec.md` §4.1, "Failure semantics" and §7,
    /// `shape-extraction-failed`). The node itself is still recorded with no
    /// outbound edges.
    pub shape_extraction_failed: bool,
}

/// A named kind (`spec.md` §3, "Type").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: TypeId,
    /// Fully-qualified name, module-qualified where available.
    pub name: StrId,
    /// The node that represents the type object itself — "types are nodes
    /// too" (`spec.md` §3).
    pub type_node_id: NodeId,
    pub classification: Classification,
}

/// The relation a reference carries, per `spec.md` §3 ("Edge") and the
/// per-classification rules in §4.1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeLabel {
    /// Attribute name, slot name, or a runtime-internal opaque token
    /// (`f_back`, `__doc__`, iterator-target, ...).
    Attr(StrId),
    /// Mapping key whose textual representation was short and unambiguous
    /// (`spec.md` §4.1, "Edge-label policy for mapping keys").
    Key(StrId),
    /// Mapping key that is itself a tracked object: stored as a reference to
    /// the key-node plus the `<key>` sentinel (`spec.md` §4.1, dict rule).
    KeyNode(NodeId),
    /// Sequence index (list/tuple element).
    Index(u64),
    /// Unlabeled set membership (`spec.md` §4.1: "emit `(<member>,
    /// element-node)` with no positional label").
    Member,
}

/// A directed outbound reference (`spec.md` §3, "Edge"). Stored once, in
/// outbound form; the reverse index is derived by the Analysis Indexer
/// rather than carried as an in-memory back-pointer (`spec.md` §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: NodeId,
    pub label: EdgeLabel,
    pub dst: NodeId,
}
