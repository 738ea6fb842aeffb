//! Capture-pipeline tests: walking an [`EmbeddedHeap`], writing a raw
//! snapshot, reading it back, running the Analysis Indexer, and confirming
//! the shape-extraction failure path redirects a node's classification to
//! `other-builtin` (`spec.md` §4.1, "Failure semantics").

use objex_core::runtime::heap::{EmbeddedHeap, HeapBuilder};
use objex_core::runtime::{DictKey, ObjectData, ObjectId, Roots, Runtime};
use objex_core::{analyze, dump_graph, read_raw, CaptureError, Classification, DumpOptions};

fn snapshot_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("objex_test_{name}_{}.snap", std::process::id()))
}

/// Wraps an [`EmbeddedHeap`], making `get()` panic for one designated
/// object so the traversal's `catch_unwind` failure path is exercised the
/// way a corrupted or unreadable live object would trigger it.
struct FlakyHeap {
    inner: EmbeddedHeap,
    poison: ObjectId,
}

impl Runtime for FlakyHeap {
    fn roots(&self) -> Roots {
        self.inner.roots()
    }

    fn get(&self, id: ObjectId) -> &ObjectData {
        if id == self.poison {
            panic!("shape extraction deliberately failed for test");
        }
        self.inner.get(id)
    }

    fn type_of(&self, id: ObjectId) -> ObjectId {
        self.inner.type_of(id)
    }

    fn refcount(&self, id: ObjectId) -> u64 {
        self.inner.refcount(id)
    }

    fn builtin_type_for(&self, classification: Classification) -> Option<ObjectId> {
        self.inner.builtin_type_for(classification)
    }
}

#[test]
fn shape_extraction_failure_is_recorded_as_other_builtin() {
    let mut builder = HeapBuilder::new();
    let good = builder.int(7);
    let bad = builder.int(99);
    let dict = builder.alloc_builtin(
        Classification::Dict,
        ObjectData::Dict {
            entries: vec![
                (DictKey::Literal("good".to_owned()), good),
                (DictKey::Literal("bad".to_owned()), bad),
            ],
        },
    );
    let module =
        builder.alloc_builtin(Classification::Module, ObjectData::Module { name: "demo".to_owned(), dict });
    builder.add_module_root(module);

    let heap = builder.build();
    // `get()` panics specifically when `bad` is read; every other lookup,
    // including the type object's own read-back, goes through untouched.
    let runtime = FlakyHeap { inner: heap, poison: bad };

    let path = snapshot_path("shape_failure");
    dump_graph(&runtime, &path, &DumpOptions::default(), 0).unwrap();

    let raw = read_raw(&path).unwrap();
    let bad_record = raw
        .objects
        .iter()
        .find(|o| o.origin_addr == bad.index() as u64)
        .expect("the failing object is still recorded, per spec.md §4.1");
    assert!(bad_record.shape_extraction_failed);
    assert_eq!(bad_record.size, 0);
    assert!(raw.references.iter().all(|e| e.src != bad_record.id), "a failed node has no outbound edges");
    let bad_id = bad_record.id;

    let good_record = raw
        .objects
        .iter()
        .find(|o| o.origin_addr == good.index() as u64)
        .expect("the unrelated sibling object is captured normally");
    assert!(!good_record.shape_extraction_failed);

    let analyzed = analyze(raw);
    assert_eq!(
        analyzed.classification_of(bad_id),
        Some(Classification::OtherBuiltin),
        "a failed node's effective classification must read back as other-builtin"
    );

    let _ = std::fs::remove_file(&path);
}

#[test]
fn capture_then_analyze_round_trip_preserves_counts() {
    let mut builder = HeapBuilder::new();
    let s = builder.str("hello");
    let dict = builder.alloc_builtin(Classification::Dict, ObjectData::Dict { entries: vec![(DictKey::Literal("greeting".to_owned()), s)] });
    let module = builder.alloc_builtin(Classification::Module, ObjectData::Module { name: "demo".to_owned(), dict });
    builder.add_module_root(module);
    let heap = builder.build();

    let path = snapshot_path("round_trip");
    dump_graph(&heap, &path, &DumpOptions::default(), 4096).unwrap();

    let raw = read_raw(&path).unwrap();
    assert_eq!(raw.header.node_count as usize, raw.objects.len());
    assert_eq!(raw.header.edge_count as usize, raw.references.len());
    assert_eq!(raw.header.type_count as usize, raw.types.len());
    assert!(!raw.header.incomplete, "finish() must clear the incomplete flag");

    let analyzed = analyze(raw);
    assert_eq!(analyzed.stats.total_nodes, analyzed.objects.len() as u64);
    assert!(analyzed.is_root(module_node_id(&analyzed, module)));

    let _ = std::fs::remove_file(&path);
}

fn module_node_id(analyzed: &objex_core::AnalyzedSnapshot, module: ObjectId) -> objex_core::NodeId {
    analyzed
        .objects
        .iter()
        .find(|o| o.origin_addr == module.index() as u64)
        .map(|o| o.id)
        .expect("module root must be present in the analyzed snapshot")
}

#[test]
fn unreadable_type_object_redirects_to_other_builtin_type() {
    let mut builder = HeapBuilder::new();
    let type_of_type = builder.builtin_type(Classification::Type);

    // A user-defined class whose own object data will be made unreadable,
    // distinct from the `bad`/`good` instances below whose *data*, not
    // *type*, raises.
    let class_dict = builder.empty_dict();
    let broken_class = builder.alloc(
        type_of_type,
        ObjectData::Type {
            name: "Broken".to_owned(),
            dict: class_dict,
            mro: Vec::new(),
            slot_names: Vec::new(),
            instance_classification: Classification::UserInstance,
        },
    );
    let instance = builder.alloc(broken_class, ObjectData::UserInstance { dict: None, slots: Vec::new() });
    let module_dict = builder.alloc_builtin(
        Classification::Dict,
        ObjectData::Dict { entries: vec![(DictKey::Literal("inst".to_owned()), instance)] },
    );
    let module =
        builder.alloc_builtin(Classification::Module, ObjectData::Module { name: "demo".to_owned(), dict: module_dict });
    builder.add_module_root(module);

    let heap = builder.build();
    // Reading `instance` itself succeeds; reading its *type object*
    // (`broken_class`) panics, exercising the type-level failure path
    // distinct from `shape_extraction_failure_is_recorded_as_other_builtin`.
    let runtime = FlakyHeap { inner: heap, poison: broken_class };

    let path = snapshot_path("broken_type");
    dump_graph(&runtime, &path, &DumpOptions::default(), 0).unwrap();

    let raw = read_raw(&path).unwrap();
    let instance_record = raw
        .objects
        .iter()
        .find(|o| o.origin_addr == instance.index() as u64)
        .expect("the instance itself is still recorded");
    assert!(!instance_record.shape_extraction_failed, "only the type object was unreadable, not the instance");

    let analyzed = analyze(raw);
    assert_eq!(
        analyzed.classification_of(instance_record.id),
        Some(Classification::OtherBuiltin),
        "an instance whose type object can't be read must still resolve to a real type row"
    );
    let type_row = analyzed
        .types
        .iter()
        .find(|t| t.id == instance_record.type_id)
        .expect("`type_id` must resolve to a row in `type`, even for an unreadable type object");
    let type_node = analyzed.object(type_row.type_node_id).expect("type_node_id must resolve to an object row");
    assert_eq!(
        analyzed.classification_of(type_node.id),
        Some(Classification::Type),
        "the substituted type's own node must itself be classified `type`"
    );

    let _ = std::fs::remove_file(&path);
}

#[test]
fn capture_flushes_strings_alongside_every_batch_not_just_objects() {
    // More than `BATCH_SIZE` distinct string-keyed dict entries off a single
    // module forces `push_edge` (and the string interning that precedes it
    // in `convert_edge`) past a batch boundary without ever calling
    // `push_object` in between. Before the fix, only `push_object`'s
    // batch-size trigger flushed the string table, so this would write
    // `EdgeRecord`s whose `StrId` labels were never flushed, and reading
    // them back would panic on an out-of-bounds string lookup.
    let count = objex_core::snapshot::BATCH_SIZE * 2 + 17;
    let mut builder = HeapBuilder::new();
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let value = builder.int(i as i64);
        entries.push((DictKey::Literal(format!("key_{i}")), value));
    }
    let dict = builder.alloc_builtin(Classification::Dict, ObjectData::Dict { entries });
    let module =
        builder.alloc_builtin(Classification::Module, ObjectData::Module { name: "demo".to_owned(), dict });
    builder.add_module_root(module);
    let heap = builder.build();

    let path = snapshot_path("batch_boundary_strings");
    dump_graph(&heap, &path, &DumpOptions::default(), 0).unwrap();

    let raw = read_raw(&path).unwrap();
    assert_eq!(raw.references.len(), count);

    let analyzed = analyze(raw);
    let engine = objex_core::QueryEngine::new(&analyzed);
    let dict_node = analyzed
        .objects
        .iter()
        .find(|o| o.origin_addr == dict.index() as u64)
        .expect("the dict node is present")
        .id;
    // Resolving every edge's label string is what panicked before the fix
    // (`StringTable::get` indexing past the end of a never-flushed batch).
    let outbound = engine.outbound(dict_node).unwrap();
    assert_eq!(outbound.len(), count);
    for edge in &outbound {
        assert!(edge.label.starts_with("key_"));
    }

    let _ = std::fs::remove_file(&path);
}

#[test]
fn a_runtime_with_no_readable_roots_fails_capture_cleanly() {
    struct EmptyRuntime;
    impl Runtime for EmptyRuntime {
        fn roots(&self) -> Roots {
            Roots::default()
        }
        fn get(&self, _id: ObjectId) -> &ObjectData {
            panic!("no object should ever be read from an empty root set")
        }
        fn type_of(&self, _id: ObjectId) -> ObjectId {
            panic!("no object should ever be read from an empty root set")
        }
        fn refcount(&self, _id: ObjectId) -> u64 {
            0
        }
    }

    let path = snapshot_path("no_roots");
    let err = dump_graph(&EmptyRuntime, &path, &DumpOptions::default(), 0).unwrap_err();
    assert!(matches!(err, CaptureError::NoReadableRoots));
    let _ = std::fs::remove_file(&path);
}
