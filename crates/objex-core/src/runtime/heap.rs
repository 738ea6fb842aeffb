//! An in-memory dynamic-object heap used as the capture target for this
//! crate's own tests and reference CLI.
//!
//! The arena shape — a `Vec<Option<Slot>>` with a free list of reusable
//! indices — mirrors the teacher's `Heap<T>` arena in `heap.rs`: allocation
//! pops a freed slot if one is available, otherwise appends; `get` panics on
//! a missing or freed slot rather than threading an `Option` through every
//! caller, matching the teacher's `Heap::get`.

use ahash::AHashMap;

use super::{ObjectData, ObjectId, Roots, Runtime};
use crate::model::Classification;

struct Slot {
    type_of: ObjectId,
    refcount: u64,
    data: ObjectData,
}

/// A small, self-contained dynamic-object heap: modules, frames, dicts,
/// lists, user classes and instances, all addressable by [`ObjectId`].
///
/// Built with [`HeapBuilder`]; read through the [`Runtime`] trait by the
/// Traversal Engine.
pub struct EmbeddedHeap {
    entries: Vec<Option<Slot>>,
    free_list: Vec<ObjectId>,
    roots: Roots,
    builtin_types: AHashMap<Classification, ObjectId>,
}

impl EmbeddedHeap {
    #[must_use]
    pub fn builder() -> HeapBuilder {
        HeapBuilder::new()
    }
}

impl Runtime for EmbeddedHeap {
    fn roots(&self) -> Roots {
        self.roots.clone()
    }

    fn get(&self, id: ObjectId) -> &ObjectData {
        &self
            .entries
            .get(id.index())
            .expect("EmbeddedHeap::get: slot out of range")
            .as_ref()
            .expect("EmbeddedHeap::get: slot is freed")
            .data
    }

    fn type_of(&self, id: ObjectId) -> ObjectId {
        self.entries
            .get(id.index())
            .expect("EmbeddedHeap::type_of: slot out of range")
            .as_ref()
            .expect("EmbeddedHeap::type_of: slot is freed")
            .type_of
    }

    fn refcount(&self, id: ObjectId) -> u64 {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .map_or(0, |slot| slot.refcount)
    }

    fn builtin_type_for(&self, classification: Classification) -> Option<ObjectId> {
        self.builtin_types.get(&classification).copied()
    }
}

/// Incrementally constructs an [`EmbeddedHeap`], allocating the builtin type
/// objects (`module`, `frame`, `function`, `code`, `type`, `dict`, `list`,
/// `tuple`, `set`, `str`, `bytes`, `int`, `float`) up front so every object
/// allocated afterwards can reference one.
pub struct HeapBuilder {
    entries: Vec<Option<Slot>>,
    free_list: Vec<ObjectId>,
    builtin_types: AHashMap<Classification, ObjectId>,
    /// Builtin type objects in installation order, so the root seed group
    /// has a deterministic order (`spec.md` §4.1, "Ordering and tie-breaks").
    builtin_type_order: Vec<ObjectId>,
    modules: Vec<ObjectId>,
    frames: Vec<ObjectId>,
}

impl HeapBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            builtin_types: AHashMap::new(),
            builtin_type_order: Vec::new(),
            modules: Vec::new(),
            frames: Vec::new(),
        };
        builder.install_builtin_types();
        builder
    }

    fn install_builtin_types(&mut self) {
        // `type` is its own type in a real runtime; we tie off the bootstrap
        // cycle the same way, since the traversal must tolerate cycles
        // (`spec.md` §3 invariant).
        let type_of_type = ObjectId(self.entries.len());
        let dict = self.raw_alloc(type_of_type, ObjectData::Dict { entries: Vec::new() });
        self.entries[type_of_type.index()] = Some(Slot {
            type_of: type_of_type,
            refcount: 1,
            data: ObjectData::Type {
                name: "type".to_owned(),
                dict,
                mro: Vec::new(),
                slot_names: Vec::new(),
                instance_classification: Classification::Type,
            },
        });
        self.builtin_types.insert(Classification::Type, type_of_type);
        self.builtin_type_order.push(type_of_type);

        for (classification, name) in [
            (Classification::Module, "module"),
            (Classification::Frame, "frame"),
            (Classification::Function, "function"),
            (Classification::Code, "code"),
            (Classification::Dict, "dict"),
            (Classification::List, "list"),
            (Classification::Tuple, "tuple"),
            (Classification::Set, "set"),
            (Classification::String, "str"),
            (Classification::Bytes, "bytes"),
            (Classification::Int, "int"),
            (Classification::Float, "float"),
            (Classification::OtherBuiltin, "other-builtin"),
        ] {
            let dict = self.alloc(type_of_type, ObjectData::Dict { entries: Vec::new() });
            let id = self.alloc(
                type_of_type,
                ObjectData::Type {
                    name: name.to_owned(),
                    dict,
                    mro: Vec::new(),
                    slot_names: Vec::new(),
                    instance_classification: classification,
                },
            );
            self.builtin_types.insert(classification, id);
            self.builtin_type_order.push(id);
        }
    }

    fn raw_alloc(&mut self, type_of: ObjectId, data: ObjectData) -> ObjectId {
        let id = if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(Slot {
                type_of,
                refcount: 1,
                data,
            });
            id
        } else {
            let id = ObjectId(self.entries.len());
            self.entries.push(Some(Slot {
                type_of,
                refcount: 1,
                data,
            }));
            id
        };
        id
    }

    /// Allocates `data` with type `type_of`.
    pub fn alloc(&mut self, type_of: ObjectId, data: ObjectData) -> ObjectId {
        self.raw_alloc(type_of, data)
    }

    /// Convenience allocator for a value of a builtin classification, using
    /// the pre-installed builtin type object for `classification`.
    ///
    /// # Panics
    /// Panics if `classification` has no pre-installed builtin type (e.g.
    /// `UserInstance`, which always needs a caller-defined class).
    pub fn alloc_builtin(&mut self, classification: Classification, data: ObjectData) -> ObjectId {
        let type_of = *self
            .builtin_types
            .get(&classification)
            .expect("no builtin type installed for this classification");
        self.raw_alloc(type_of, data)
    }

    #[must_use]
    pub fn builtin_type(&self, classification: Classification) -> ObjectId {
        *self
            .builtin_types
            .get(&classification)
            .expect("no builtin type installed for this classification")
    }

    pub fn str(&mut self, value: impl Into<String>) -> ObjectId {
        self.alloc_builtin(Classification::String, ObjectData::Str { value: value.into() })
    }

    pub fn int(&mut self, value: i64) -> ObjectId {
        self.alloc_builtin(Classification::Int, ObjectData::Int { value })
    }

    pub fn empty_dict(&mut self) -> ObjectId {
        self.alloc_builtin(Classification::Dict, ObjectData::Dict { entries: Vec::new() })
    }

    /// Registers `id` as a root module.
    pub fn add_module_root(&mut self, id: ObjectId) {
        self.modules.push(id);
    }

    /// Registers `id` as a root frame. Frames are pushed topmost-first, so
    /// register the innermost (currently executing) frame first.
    pub fn add_frame_root(&mut self, id: ObjectId) {
        self.frames.push(id);
    }

    #[must_use]
    pub fn build(self) -> EmbeddedHeap {
        let builtin_type_order = self.builtin_type_order;
        EmbeddedHeap {
            entries: self.entries,
            free_list: self.free_list,
            roots: Roots {
                modules: self.modules,
                frames: self.frames,
                builtin_types: builtin_type_order,
            },
            builtin_types: self.builtin_types,
        }
    }
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}
