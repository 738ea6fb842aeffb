//! The six scenarios and five cross-snapshot invariants from `spec.md` §8,
//! built directly against the Analysis Indexer and Query Engine over
//! hand-constructed raw tables (no live runtime involved — these scenarios
//! describe snapshot shapes, not traversal behavior; traversal-level
//! capture is covered by `traversal_and_capture.rs`).

use objex_core::snapshot::{Header, FORMAT_VERSION, SCHEMA_RAW};
use objex_core::strings::StringTable;
use objex_core::{
    analyze, AnalyzedSnapshot, Classification, EdgeLabel, EdgeRecord, NodeId, NodeRecord, QueryEngine, RawSnapshot,
    Termination, TypeId, TypeRecord,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Incrementally builds a raw snapshot's tables, bootstrapping the `type`
/// type as its own type the same way `HeapBuilder::install_builtin_types`
/// does, so every fixture satisfies the "every `object.type_id` resolves to
/// a row in `type` whose `type_node_id` is itself a row in `object` with
/// classification `type`" invariant without repeating the wiring per test.
struct Fixture {
    objects: Vec<NodeRecord>,
    types: Vec<TypeRecord>,
    references: Vec<EdgeRecord>,
    strings: StringTable,
    next_node: u64,
    next_type: u32,
    type_of_type: TypeId,
}

impl Fixture {
    fn new() -> Self {
        let mut strings = StringTable::new();
        let name = strings.intern("type");
        let type_node_id = NodeId::new(0);
        let type_of_type = TypeId::new(0);
        let objects = vec![NodeRecord {
            id: type_node_id,
            type_id: type_of_type,
            size: 0,
            refcount: 1,
            len: None,
            preview: None,
            origin_addr: 0,
            shape_extraction_failed: false,
        }];
        let types = vec![TypeRecord { id: type_of_type, name, type_node_id, classification: Classification::Type }];
        Self { objects, types, references: Vec::new(), strings, next_node: 1, next_type: 1, type_of_type }
    }

    fn add_type(&mut self, name: &str, classification: Classification) -> TypeId {
        let node_id = NodeId::new(self.next_node);
        self.next_node += 1;
        let type_id = TypeId::new(self.next_type);
        self.next_type += 1;
        let name_id = self.strings.intern(name);
        self.objects.push(NodeRecord {
            id: node_id,
            type_id: self.type_of_type,
            size: 0,
            refcount: 1,
            len: None,
            preview: None,
            origin_addr: node_id.index(),
            shape_extraction_failed: false,
        });
        self.types.push(TypeRecord { id: type_id, name: name_id, type_node_id: node_id, classification });
        type_id
    }

    fn add_object(&mut self, type_id: TypeId, size: u64) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.objects.push(NodeRecord {
            id,
            type_id,
            size,
            refcount: 1,
            len: None,
            preview: None,
            origin_addr: id.index(),
            shape_extraction_failed: false,
        });
        id
    }

    fn attr(&mut self, src: NodeId, name: &str, dst: NodeId) {
        let label = EdgeLabel::Attr(self.strings.intern(name));
        self.references.push(EdgeRecord { src, label, dst });
    }

    fn member(&mut self, src: NodeId, dst: NodeId) {
        self.references.push(EdgeRecord { src, label: EdgeLabel::Member, dst });
    }

    fn analyze(self) -> AnalyzedSnapshot {
        let header = Header {
            format_version: FORMAT_VERSION,
            schema_version: SCHEMA_RAW,
            incomplete: false,
            captured_at_unix: 0,
            hostname: "test-host".to_owned(),
            target_rss_bytes: 0,
            node_count: self.objects.len() as u64,
            edge_count: self.references.len() as u64,
            type_count: self.types.len() as u64,
            string_count: self.strings.len() as u64,
        };
        let raw =
            RawSnapshot { header, objects: self.objects, types: self.types, references: self.references, strings: self.strings };
        analyze(raw)
    }
}

// =============================================================================
// Scenario 1: cycle
// =============================================================================

#[test]
fn cycle_has_no_root_and_empty_path_result() {
    let mut fx = Fixture::new();
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let a = fx.add_object(other_builtin, 16);
    let b = fx.add_object(other_builtin, 16);
    let c = fx.add_object(other_builtin, 16);
    fx.member(a, b);
    fx.member(b, c);
    fx.member(c, a);

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let result = engine.paths_to_roots(a, 5, 1_000_000).unwrap();
    assert!(result.paths.is_empty(), "cyclic island has no root to reach: {:?}", result.paths);
    assert_eq!(result.termination, Termination::NoRootReachable);
    assert!(!result.budget_exhausted, "three nodes should never exhaust a million-node budget");

    let inbound = engine.inbound(a).unwrap();
    assert_eq!(inbound.len(), 1, "A has exactly one inbound edge, from C");
    assert_eq!(inbound[0].node, c);
}

// =============================================================================
// Scenario 2: module-retained leaf
// =============================================================================

#[test]
fn module_retained_leaf_reports_single_path_and_inbound() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let string_type = fx.add_type("str", Classification::String);
    let m = fx.add_object(module_type, 64);
    let s = fx.add_object(string_type, 5);
    fx.attr(m, "x", s);

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let result = engine.paths_to_roots(s, 1, 1_000_000).unwrap();
    assert_eq!(result.termination, Termination::ModuleReachable);
    assert_eq!(result.paths.len(), 1);
    assert_eq!(result.paths[0].nodes, vec![m, s]);
    assert_eq!(result.paths[0].labels, vec!["x".to_owned()]);

    let inbound = engine.inbound(s).unwrap();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].node, m);
    assert_eq!(inbound[0].label, "x");
}

// =============================================================================
// Scenario 3: frame-only retention
// =============================================================================

#[test]
fn frame_only_retention_is_classified_distinctly_from_module_retention() {
    let mut fx = Fixture::new();
    let frame_type = fx.add_type("frame", Classification::Frame);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let f = fx.add_object(frame_type, 96);
    let o = fx.add_object(other_builtin, 24);
    fx.attr(f, "t", o);

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let result = engine.paths_to_roots(o, 1, 1_000_000).unwrap();
    assert_eq!(result.termination, Termination::FrameOnly);
    assert_eq!(result.paths.len(), 1);
    assert_eq!(result.paths[0].nodes[0], f);
}

// =============================================================================
// Scenario 4: fan-in singleton
// =============================================================================

#[test]
fn fan_in_singleton_prefers_module_rooted_path() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let holder_type = fx.add_type("dict", Classification::Dict);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);

    let singleton = fx.add_object(other_builtin, 0);
    let m = fx.add_object(module_type, 64);
    fx.attr(m, "the_singleton", singleton);

    // 10,000 unrelated, non-root holder objects all also reference the
    // singleton, modeling pathological fan-in (`spec.md` §8 scenario 4,
    // "a None-analog"). None of them lead anywhere further, so the search
    // must not need to expand past this first frontier to find the module.
    for _ in 0..10_000 {
        let holder = fx.add_object(holder_type, 48);
        fx.attr(holder, "slot", singleton);
    }

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let result = engine.paths_to_roots(singleton, 1, 1_000_000).unwrap();
    assert!(!result.budget_exhausted);
    assert_eq!(result.termination, Termination::ModuleReachable);
    assert_eq!(result.paths[0].nodes[0], m, "module-rooted path must win the fan-in tie-break");
}

// =============================================================================
// Scenario 5: dict with object-valued key
// =============================================================================

#[test]
fn dict_with_object_key_emits_key_sentinel_and_repr_edge() {
    let mut fx = Fixture::new();
    let dict_type = fx.add_type("dict", Classification::Dict);
    let user_instance_type = fx.add_type("MyKey", Classification::UserInstance);
    let int_type = fx.add_type("int", Classification::Int);

    let d = fx.add_object(dict_type, 48);
    let k = fx.add_object(user_instance_type, 32);
    let v = fx.add_object(int_type, 8);
    fx.references.push(EdgeRecord { src: d, label: EdgeLabel::KeyNode(k), dst: k });
    let key_label = fx.strings.intern("<MyKey#instance>");
    fx.references.push(EdgeRecord { src: d, label: EdgeLabel::Key(key_label), dst: v });

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let outbound = engine.outbound(d).unwrap();
    assert_eq!(outbound.len(), 2);
    assert!(outbound.iter().any(|e| e.label == "<key>" && e.node == k));
    assert!(outbound.iter().any(|e| e.node == v));
}

// =============================================================================
// Scenario 6: random reachability
// =============================================================================

#[test]
fn random_samples_only_non_root_nodes() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let m = fx.add_object(module_type, 64);

    let mut leaves = Vec::new();
    for i in 0..200 {
        let leaf = fx.add_object(other_builtin, 8);
        fx.attr(m, &format!("leaf_{i}"), leaf);
        leaves.push(leaf);
    }

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for _ in 0..1_000 {
        let id = engine.random(&mut rng).expect("non-root pool is non-empty");
        assert_ne!(id, m, "random() must never draw a root node");
        assert!(leaves.contains(&id), "random() drew an id outside the expected non-root set");
    }
}

// =============================================================================
// Cross-snapshot invariants
// =============================================================================

#[test]
fn every_edge_endpoint_resolves_to_an_object_row() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let m = fx.add_object(module_type, 64);
    let o = fx.add_object(other_builtin, 8);
    fx.attr(m, "x", o);

    let snapshot = fx.analyze();
    for edge in &snapshot.references {
        assert!(snapshot.object(edge.src).is_some());
        assert!(snapshot.object(edge.dst).is_some());
    }
}

#[test]
fn every_type_id_resolves_to_a_type_node() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let _m = fx.add_object(module_type, 64);

    let snapshot = fx.analyze();
    for object in &snapshot.objects {
        let type_row = snapshot.types.iter().find(|t| t.id == object.type_id).expect("type row must exist");
        let type_node = snapshot.object(type_row.type_node_id).expect("type_node_id must resolve");
        assert_eq!(snapshot.classification_of(type_node.id), Some(Classification::Type));
    }
}

#[test]
fn analysis_indexer_is_idempotent_modulo_timestamp() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let string_type = fx.add_type("str", Classification::String);
    let m = fx.add_object(module_type, 64);
    let s = fx.add_object(string_type, 5);
    fx.attr(m, "x", s);

    let header = Header {
        format_version: FORMAT_VERSION,
        schema_version: SCHEMA_RAW,
        incomplete: false,
        captured_at_unix: 0,
        hostname: "test-host".to_owned(),
        target_rss_bytes: 0,
        node_count: fx.objects.len() as u64,
        edge_count: fx.references.len() as u64,
        type_count: fx.types.len() as u64,
        string_count: fx.strings.len() as u64,
    };
    let raw_a = RawSnapshot {
        header: header.clone(),
        objects: fx.objects.clone(),
        types: fx.types.clone(),
        references: fx.references.clone(),
        strings: fx.strings.clone(),
    };
    let raw_b = RawSnapshot { header, objects: fx.objects, types: fx.types, references: fx.references, strings: fx.strings };

    let analyzed_a = analyze(raw_a);
    let analyzed_b = analyze(raw_b);

    assert_eq!(analyzed_a.reverse.len(), analyzed_b.reverse.len());
    for (left, right) in analyzed_a.reverse.iter().zip(analyzed_b.reverse.iter()) {
        assert_eq!(left.dst, right.dst);
        assert_eq!(left.src, right.src);
    }
    assert_eq!(analyzed_a.roots, analyzed_b.roots);
    assert_eq!(analyzed_a.non_root_nodes, analyzed_b.non_root_nodes);
    assert_eq!(analyzed_a.stats.total_nodes, analyzed_b.stats.total_nodes);
    assert_eq!(analyzed_a.stats.total_bytes, analyzed_b.stats.total_bytes);
    assert_eq!(analyzed_a.stats.per_classification, analyzed_b.stats.per_classification);
}

#[test]
fn inbound_matches_the_reference_table_exactly() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let m = fx.add_object(module_type, 64);
    let a = fx.add_object(other_builtin, 8);
    let b = fx.add_object(other_builtin, 8);
    fx.attr(m, "a", a);
    fx.attr(m, "b", b);
    fx.member(a, b);

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let inbound_b = engine.inbound(b).unwrap();
    let expected: Vec<NodeId> = snapshot.references.iter().filter(|e| e.dst == b).map(|e| e.src).collect();
    let actual: Vec<NodeId> = inbound_b.iter().map(|e| e.node).collect();
    assert_eq!(actual.len(), expected.len());
    for src in expected {
        assert!(actual.contains(&src));
    }
}

#[test]
fn paths_to_roots_always_starts_at_a_root_and_ends_at_the_target() {
    let mut fx = Fixture::new();
    let module_type = fx.add_type("module", Classification::Module);
    let other_builtin = fx.add_type("other-builtin", Classification::OtherBuiltin);
    let m = fx.add_object(module_type, 64);
    let a = fx.add_object(other_builtin, 8);
    let b = fx.add_object(other_builtin, 8);
    fx.attr(m, "a", a);
    fx.attr(a, "b", b);

    let snapshot = fx.analyze();
    let engine = QueryEngine::new(&snapshot);

    let result = engine.paths_to_roots(b, 3, 1_000_000).unwrap();
    for path in &result.paths {
        assert!(snapshot.is_root(path.nodes[0]), "first node of every path must be a root");
        assert_eq!(*path.nodes.last().unwrap(), b, "last node of every path must be the query target");
        assert_eq!(path.labels.len(), path.nodes.len() - 1);
    }
}
