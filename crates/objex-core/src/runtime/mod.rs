//! The capture target: an abstraction over "a live dynamic-object runtime"
//! (`spec.md` §4.1) plus a small embedded implementation of one.
//!
//! `spec.md` §9 anticipates exactly this shape for a systems-language rewrite:
//! "the adapter becomes an embedded-interpreter interface with a
//! tagged-variant per classification." [`ObjectData`] is that tagged variant
//! set, one arm per `spec.md` §3 classification. [`Runtime`] is the trait the
//! Traversal Engine (`crate::traversal`) walks; [`heap::EmbeddedHeap`] is the
//! concrete, in-memory runtime used by this crate's own tests, the bundled
//! CLI demo, and anywhere else a live CPython process isn't available. A
//! production deployment implements `Runtime` over an FFI reflection facade
//! instead and plugs into the same traversal/writer/indexer/query pipeline
//! unchanged.

pub mod heap;

use crate::model::Classification;

/// Identity of an object inside the source runtime, analogous to the
/// teacher's `HeapId`: a dense arena index, not a real memory address. Stored
/// on [`NodeRecord`](crate::model::NodeRecord) as `origin_addr` for
/// operator-facing display once the walk assigns dense `NodeId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A key in a dict-shaped object: either a literal (short, unambiguous
/// textual representation) or a reference to a tracked key-object, per the
/// edge-label policy in `spec.md` §4.1.
#[derive(Debug, Clone)]
pub enum DictKey {
    Literal(String),
    Object(ObjectId),
}

/// One runtime-internal reference for the "opaque/other" shape-adapter
/// fallback (`spec.md` §4.1: "fall back to the runtime's generic referent
/// enumeration, labeling edges with an opaque discriminator token").
#[derive(Debug, Clone)]
pub struct OpaqueReferent {
    pub token: String,
    pub target: ObjectId,
}

/// The tagged variant set behind every object's shape. One arm per
/// classification in `spec.md` §3; the mapping ordering within each
/// collection variant is the "natural order" the shape adapter preserves
/// (`spec.md` §4.1, "Ordering and tie-breaks").
#[derive(Debug, Clone)]
pub enum ObjectData {
    Module {
        name: String,
        dict: ObjectId,
    },
    Frame {
        locals: ObjectId,
        globals: ObjectId,
        f_back: Option<ObjectId>,
    },
    Function {
        name: String,
        qualname: String,
        module: Option<ObjectId>,
        defaults: Vec<ObjectId>,
        closure: Vec<ObjectId>,
        code: Option<ObjectId>,
        dict: Option<ObjectId>,
    },
    Code {
        name: String,
        filename: String,
    },
    /// A type object. `instance_classification` is the classification
    /// objects of this type get (e.g. the `list` type's instances are
    /// classified `List`); the type node *itself* is always classified
    /// `Type` in the object table (`spec.md` §3: "types are nodes too").
    Type {
        name: String,
        dict: ObjectId,
        mro: Vec<ObjectId>,
        slot_names: Vec<String>,
        instance_classification: Classification,
    },
    Dict {
        entries: Vec<(DictKey, ObjectId)>,
    },
    List {
        items: Vec<ObjectId>,
    },
    Tuple {
        items: Vec<ObjectId>,
    },
    Set {
        items: Vec<ObjectId>,
    },
    Str {
        value: String,
    },
    Bytes {
        value: Vec<u8>,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    /// Generic fallback for runtime-internal holders with no dedicated shape
    /// rule (coroutines, generators, iterators, mapping proxies; `spec.md`
    /// §9, "Coroutine / generator objects").
    OtherBuiltin {
        label: String,
        referents: Vec<OpaqueReferent>,
    },
    UserInstance {
        dict: Option<ObjectId>,
        slots: Vec<ObjectId>,
    },
}

impl ObjectData {
    #[must_use]
    pub fn classification_of_instances(&self) -> Option<Classification> {
        match self {
            Self::Type {
                instance_classification,
                ..
            } => Some(*instance_classification),
            _ => None,
        }
    }

    /// The classification a node holding this data is itself reported as,
    /// i.e. not "what does this type produce" but "what kind of node is
    /// this".
    #[must_use]
    pub fn own_classification(&self) -> Classification {
        match self {
            Self::Module { .. } => Classification::Module,
            Self::Frame { .. } => Classification::Frame,
            Self::Function { .. } => Classification::Function,
            Self::Code { .. } => Classification::Code,
            Self::Type { .. } => Classification::Type,
            Self::Dict { .. } => Classification::Dict,
            Self::List { .. } => Classification::List,
            Self::Tuple { .. } => Classification::Tuple,
            Self::Set { .. } => Classification::Set,
            Self::Str { .. } => Classification::String,
            Self::Bytes { .. } => Classification::Bytes,
            Self::Int { .. } => Classification::Int,
            Self::Float { .. } => Classification::Float,
            Self::OtherBuiltin { .. } => Classification::OtherBuiltin,
            Self::UserInstance { .. } => Classification::UserInstance,
        }
    }

    /// Approximate byte size used to populate `NodeRecord::size`
    /// (`spec.md` §3: "a byte size").
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        match self {
            Self::Str { value } => value.len() as u64,
            Self::Bytes { value } => value.len() as u64,
            Self::List { items } | Self::Tuple { items } | Self::Set { items } => {
                (items.len() * std::mem::size_of::<ObjectId>()) as u64
            }
            Self::Dict { entries } => (entries.len() * 2 * std::mem::size_of::<ObjectId>()) as u64,
            _ => std::mem::size_of::<Self>() as u64,
        }
    }

    /// Length for sized containers, populating `NodeRecord::len`.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Str { value } => Some(value.chars().count() as u64),
            Self::Bytes { value } => Some(value.len() as u64),
            Self::List { items } | Self::Tuple { items } | Self::Set { items } => Some(items.len() as u64),
            Self::Dict { entries } => Some(entries.len() as u64),
            _ => None,
        }
    }
}

/// The seed set the traversal starts from (`spec.md` §4.1: "all loaded
/// modules, all currently live stack frames... and the type objects for
/// every built-in classification"), already in the ordering the walk visits
/// them in.
#[derive(Debug, Clone, Default)]
pub struct Roots {
    /// Modules, sorted by name.
    pub modules: Vec<ObjectId>,
    /// Live stack frames, topmost first.
    pub frames: Vec<ObjectId>,
    /// Builtin type objects.
    pub builtin_types: Vec<ObjectId>,
}

/// The interface the Traversal Engine walks (`spec.md` §4.1: "Given a live
/// runtime, emit a stream of `(node-record, outbound-edges)` pairs").
pub trait Runtime {
    fn roots(&self) -> Roots;
    fn get(&self, id: ObjectId) -> &ObjectData;
    /// The type object this object is an instance of.
    fn type_of(&self, id: ObjectId) -> ObjectId;
    /// Reference count as observed during capture (`spec.md` §3).
    fn refcount(&self, id: ObjectId) -> u64;
    /// Whether `id` should currently be treated as "including the
    /// capturing process's own frames" is handled by the caller
    /// (`dump_graph`'s options), not by the runtime itself.
    fn include_self_frames_default(&self) -> bool {
        false
    }

    /// The runtime's builtin type object for `classification`, if it has
    /// one readily addressable. The Traversal Engine uses this to re-point
    /// a node's type to the generic `other-builtin` type when the node's
    /// own shape adapter raised (`spec.md` §4.1, "Failure semantics":
    /// "recorded with classification `other-builtin`"), since a node's
    /// effective classification is always read back through its type
    /// record rather than stored redundantly on the node itself.
    fn builtin_type_for(&self, classification: Classification) -> Option<ObjectId> {
        let _ = classification;
        None
    }
}
