//! The Traversal Engine (`spec.md` §4.1) and the capture entry point
//! (`spec.md` §6, `dump_graph`).

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::error::CaptureError;
use crate::ids::NodeId;
use crate::model::{Classification, EdgeLabel, EdgeRecord, NodeRecord, TypeRecord};
use crate::runtime::{ObjectData, ObjectId, Runtime};
use crate::shape::{self, ShapeEdge};
use crate::snapshot::SnapshotWriter;

/// The synthetic attribute name the shape adapter uses for the "key is
/// itself a tracked object" case (`spec.md` §4.1: "emit `(key-slot,
/// key-node)` with the synthetic label `<key>`").
const KEY_SENTINEL: &str = "<key>";

/// Default preview cap for string-like objects (`spec.md` §4.1 item 1:
/// "default cap: 256 bytes for strings").
pub const DEFAULT_PREVIEW_LEN_STRING: usize = 256;
/// Default preview cap for user-instance objects ("128 for user instances").
pub const DEFAULT_PREVIEW_LEN_INSTANCE: usize = 128;

/// Options accepted by [`dump_graph`] (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Whether to include the capturing process's own frames. Default
    /// `false` per `spec.md` §6. The embedded-heap target used by this
    /// crate's tests and CLI has no built-in notion of "the capturing
    /// hook's own frame" (every frame in a test heap is caller-authored
    /// application state), so this flag is carried for contract fidelity
    /// but is presently a no-op against [`crate::runtime::heap::EmbeddedHeap`];
    /// a CPython reflection facade would use it to drop the `dump_graph`
    /// call's own stack frames from the root set.
    pub include_self_frames: bool,
    /// Maximum preview length for string-like objects.
    pub preview_len_string: usize,
    /// Maximum preview length for user-instance objects.
    pub preview_len_instance: usize,
    /// Whether the generic/opaque shape adapter rule (`spec.md` §4.1: "fall
    /// back to the runtime's generic referent enumeration") is exercised for
    /// `other-builtin` nodes. When `false`, such nodes are recorded with no
    /// outbound edges at all, modeling a runtime where tracing-GC referents
    /// aren't available.
    pub use_tracing_gc_referents: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            include_self_frames: false,
            preview_len_string: DEFAULT_PREVIEW_LEN_STRING,
            preview_len_instance: DEFAULT_PREVIEW_LEN_INSTANCE,
            use_tracing_gc_referents: true,
        }
    }
}

fn truncate_preview(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        text.to_owned()
    } else {
        let mut truncated: String = text.chars().take(cap).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

fn compute_preview(data: &ObjectData, opts: &DumpOptions) -> Option<String> {
    match data {
        ObjectData::Str { value } => Some(truncate_preview(value, opts.preview_len_string)),
        ObjectData::Bytes { value } => {
            Some(truncate_preview(&String::from_utf8_lossy(value), opts.preview_len_string))
        }
        ObjectData::UserInstance { dict, slots } => {
            let attr_count = usize::from(dict.is_some()) + slots.len();
            Some(truncate_preview(&format!("<instance, {attr_count} attrs>"), opts.preview_len_instance))
        }
        _ => None,
    }
}

/// Tracks dense [`NodeId`] allocation and the worklist, so both root seeding
/// and shape-edge discovery share one "have we seen this object" check
/// (`spec.md` §4.1: "A hash set keyed by identity prevents re-visiting").
struct Walker {
    id_of: AHashMap<ObjectId, NodeId>,
    order: Vec<ObjectId>,
    queue: VecDeque<ObjectId>,
    processed: AHashSet<ObjectId>,
    type_ids: AHashMap<ObjectId, crate::ids::TypeId>,
    /// The instance classification recorded for each effective type object
    /// the first time it was resolved, kept so every later node of that type
    /// can be cross-checked against it without re-reading the type object.
    type_instance_classification: AHashMap<ObjectId, Classification>,
}

impl Walker {
    fn new() -> Self {
        Self {
            id_of: AHashMap::new(),
            order: Vec::new(),
            queue: VecDeque::new(),
            processed: AHashSet::new(),
            type_ids: AHashMap::new(),
            type_instance_classification: AHashMap::new(),
        }
    }

    /// Returns `id`'s dense [`NodeId`], assigning a fresh one and enqueueing
    /// it for processing the first time it's seen.
    fn intern(&mut self, id: ObjectId) -> NodeId {
        if let Some(&nid) = self.id_of.get(&id) {
            return nid;
        }
        let nid = NodeId::new(self.order.len() as u64);
        self.id_of.insert(id, nid);
        self.order.push(id);
        self.queue.push_back(id);
        nid
    }
}

/// Walks every object reachable from `runtime`'s roots and streams the
/// result through `writer`, per the algorithm in `spec.md` §4.1.
///
/// Returns once the walk and all flushes complete; `writer.finish()` is
/// called on success. On error, the writer is dropped unfinished, leaving
/// the partial artifact's `incomplete` flag set.
pub fn walk(runtime: &dyn Runtime, writer: &mut SnapshotWriter, opts: &DumpOptions) -> Result<(), CaptureError> {
    let mut walker = Walker::new();
    let roots = runtime.roots();

    // Seed order: modules (by name, already sorted by the runtime), frames
    // (topmost first), builtin type objects (`spec.md` §4.1, "Ordering and
    // tie-breaks").
    for &module in &roots.modules {
        walker.intern(module);
    }
    for &frame in &roots.frames {
        walker.intern(frame);
    }
    for &ty in &roots.builtin_types {
        walker.intern(ty);
    }

    if walker.queue.is_empty() {
        return Err(CaptureError::NoReadableRoots);
    }

    while let Some(oid) = walker.queue.pop_front() {
        if !walker.processed.insert(oid) {
            continue;
        }
        let nid = walker.id_of[&oid];
        process_node(runtime, &mut walker, writer, oid, nid, opts)?;
    }

    Ok(())
}

/// `dump_graph` (`spec.md` §6): captures `runtime` into `destination_path`.
///
/// The real interface's entry point has no explicit runtime argument — in a
/// live deployment it reads ambient process state. This library is
/// parameterized over [`Runtime`] so the same traversal exercises both the
/// embedded test heap and, eventually, a CPython reflection facade behind
/// the same trait (`spec.md` §9).
pub fn dump_graph(
    runtime: &dyn Runtime,
    destination_path: impl AsRef<Path>,
    options: &DumpOptions,
    target_rss_bytes: u64,
) -> Result<(), CaptureError> {
    let mut writer = SnapshotWriter::create(destination_path, target_rss_bytes)?;
    walk(runtime, &mut writer, options)?;
    writer.finish()?;
    Ok(())
}

fn process_node(
    runtime: &dyn Runtime,
    walker: &mut Walker,
    writer: &mut SnapshotWriter,
    oid: ObjectId,
    nid: NodeId,
    opts: &DumpOptions,
) -> Result<(), CaptureError> {
    // Any individual object whose shape adapter raises is recorded with
    // classification `other-builtin`, no outbound edges, and an error flag
    // (`spec.md` §4.1, "Failure semantics"); the walk continues. A node's
    // classification is always read back through its type record, so a
    // failed node's `type_id` is redirected to the runtime's `other-builtin`
    // type (when it exposes one) rather than its real, possibly also
    // unreadable, type.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| extract(runtime, oid, opts)));
    let failed = outcome.is_err();
    if failed {
        tracing::warn!(node = nid.index(), "shape extraction failed; recording as other-builtin");
    }

    let mut type_oid = if failed {
        runtime.builtin_type_for(Classification::OtherBuiltin).unwrap_or_else(|| runtime.type_of(oid))
    } else {
        runtime.type_of(oid)
    };
    let mut type_nid = walker.intern(type_oid);
    let mut is_new_type = !walker.type_ids.contains_key(&type_oid);
    let mut type_info = if is_new_type { type_name_and_instance_classification(runtime, type_oid) } else { None };

    if is_new_type && type_info.is_none() {
        // Reading the *type object itself* raised (not just `oid`): without
        // its name/classification there is nothing to push a `TypeRecord`
        // for, which would leave every node using `type_id` dangling (§8:
        // "every `object.type_id` resolves to a row in `type`"). Apply the
        // same other-builtin redirect one level up.
        if let Some(fallback_oid) = runtime.builtin_type_for(Classification::OtherBuiltin) {
            if fallback_oid != type_oid {
                tracing::warn!(node = nid.index(), "type object unreadable; redirecting to other-builtin type");
                type_oid = fallback_oid;
                type_nid = walker.intern(type_oid);
                is_new_type = !walker.type_ids.contains_key(&type_oid);
                type_info = if is_new_type { type_name_and_instance_classification(runtime, type_oid) } else { None };
            }
        }
    }

    let next_type_index = walker.type_ids.len();
    let type_id = *walker
        .type_ids
        .entry(type_oid)
        .or_insert_with(|| crate::ids::TypeId::new(u32::try_from(next_type_index).expect("type table overflow")));

    let (size, refcount, len, preview_text, edges) = match outcome {
        Ok(Extracted { classification, size, len, preview, edges }) => {
            if let Some(&expected) = walker.type_instance_classification.get(&type_oid) {
                if classification != expected {
                    tracing::warn!(
                        node = nid.index(),
                        found = classification.as_str(),
                        expected = expected.as_str(),
                        "node classification disagrees with its type's instance classification"
                    );
                }
            }
            (size, runtime.refcount(oid), len, preview, edges)
        }
        Err(_) => (0, 0, None, None, Vec::new()),
    };

    if is_new_type {
        if let Some((name, instance_classification)) = type_info {
            walker.type_instance_classification.insert(type_oid, instance_classification);
            let name_id = writer.intern(name);
            writer.push_type(TypeRecord {
                id: type_id,
                name: name_id,
                type_node_id: type_nid,
                classification: instance_classification,
            })?;
        }
    }

    let preview = preview_text.map(|text| writer.intern(text));

    writer.push_object(NodeRecord {
        id: nid,
        type_id,
        size,
        refcount,
        len,
        preview,
        origin_addr: oid.index() as u64,
        shape_extraction_failed: failed,
    })?;

    for edge in edges {
        let (label, dst) = convert_edge(writer, walker, edge);
        writer.push_edge(EdgeRecord { src: nid, label, dst })?;
    }

    Ok(())
}

/// The type row's `name` and `classification` (`spec.md` §3, "Type"):
/// classification here is what instances of this type are classified as
/// (e.g. the `str` type's row is classified `string`), not the classification
/// of the type object's own node (which is always `Type`, recorded
/// separately on that node's own `NodeRecord`).
///
/// Returns `None` if `type_oid` raised on read or wasn't actually a `Type`
/// object; the caller redirects to the other-builtin type in that case
/// rather than leaving `type_id` pointing at a row that never gets written.
fn type_name_and_instance_classification(runtime: &dyn Runtime, type_oid: ObjectId) -> Option<(String, Classification)> {
    match panic::catch_unwind(AssertUnwindSafe(|| runtime.get(type_oid))) {
        Ok(ObjectData::Type { name, instance_classification, .. }) => Some((name.clone(), *instance_classification)),
        _ => None,
    }
}

struct Extracted {
    classification: Classification,
    size: u64,
    len: Option<u64>,
    preview: Option<String>,
    edges: Vec<ShapeEdge>,
}

fn extract(runtime: &dyn Runtime, oid: ObjectId, opts: &DumpOptions) -> Extracted {
    let data = runtime.get(oid);
    let classification = data.own_classification();
    let size = data.estimated_size();
    let len = data.len();
    let preview = compute_preview(data, opts);
    let edges = if matches!(data, ObjectData::OtherBuiltin { .. }) && !opts.use_tracing_gc_referents {
        Vec::new()
    } else {
        shape::outbound(runtime, data)
    };
    Extracted { classification, size, len, preview, edges }
}

fn convert_edge(writer: &mut SnapshotWriter, walker: &mut Walker, edge: ShapeEdge) -> (EdgeLabel, NodeId) {
    match edge {
        ShapeEdge::Attr(KEY_SENTINEL, target) => {
            let nid = walker.intern(target);
            (EdgeLabel::KeyNode(nid), nid)
        }
        ShapeEdge::Attr(name, target) => (EdgeLabel::Attr(writer.intern(name)), walker.intern(target)),
        ShapeEdge::NamedAttr(name, target) => (EdgeLabel::Attr(writer.intern(&name)), walker.intern(target)),
        ShapeEdge::Key(text, target) => (EdgeLabel::Key(writer.intern(&text)), walker.intern(target)),
        ShapeEdge::Index(index, target) => (EdgeLabel::Index(index), walker.intern(target)),
        ShapeEdge::Member(target) => (EdgeLabel::Member, walker.intern(target)),
    }
}
