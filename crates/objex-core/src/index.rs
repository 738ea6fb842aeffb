//! The Analysis Indexer (`spec.md` §4.3): turns a raw snapshot into a
//! query-ready artifact by materializing the reverse-edge index, the
//! type-to-members index, the root marker, and summary statistics.
//!
//! `analyze` is a pure, in-memory transform — offline and idempotent per
//! `spec.md` §4.3 ("running it twice on the same input yields
//! byte-identical output, modulo timestamps in the header"). The only
//! non-deterministic field is `analyzed_at_unix`; everything else is a
//! deterministic function of the raw snapshot's already-deterministic
//! traversal order.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, WriterError};
use crate::ids::{NodeId, TypeId};
use crate::model::{Classification, EdgeLabel, EdgeRecord, NodeRecord, TypeRecord};
use crate::snapshot::{self, Header, RawSnapshot, FORMAT_VERSION, SCHEMA_ANALYZED};
use crate::strings::StringTable;

/// One row of the reverse-edge index: "`src` points to `dst` via `label`",
/// stored keyed for lookup by `dst` (`spec.md` §4.3 item 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseEntry {
    pub dst: NodeId,
    pub src: NodeId,
    pub label: EdgeLabel,
}

/// Summary statistics (`spec.md` §4.3 item 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_nodes: u64,
    pub total_bytes: u64,
    /// Per-classification counts. A `BTreeMap` keyed by the enum's derived
    /// `Ord` so serialized output is deterministic across runs, matching
    /// the idempotency requirement.
    pub per_classification: std::collections::BTreeMap<Classification, u64>,
}

/// The analyzed artifact: raw tables plus the indices the Query Engine
/// reads (`spec.md` §4.3, §4.4).
#[derive(Debug, Clone)]
pub struct AnalyzedSnapshot {
    pub header: Header,
    pub analyzed_at_unix: u64,
    pub objects: Vec<NodeRecord>,
    pub types: Vec<TypeRecord>,
    pub references: Vec<EdgeRecord>,
    pub strings: StringTable,
    /// Sorted by `dst` (stable within equal `dst`, preserving the original
    /// traversal's edge-discovery order — `spec.md` §4.1, "Ordering and
    /// tie-breaks" flows through to the derived index).
    pub reverse: Vec<ReverseEntry>,
    /// Insertion order follows first-discovery order of each type, matching
    /// the teacher's `IndexMap`-for-determinism idiom.
    pub type_members: IndexMap<TypeId, Vec<NodeId>>,
    /// Sorted, deduplicated node ids of classification `module` or `frame`
    /// (`spec.md` §4.3 item 3, "a bitmap or sorted list of root node ids").
    pub roots: Vec<NodeId>,
    /// The complement of `roots`, precomputed so `random()` (`spec.md`
    /// §4.4: "uniformly sampled over all non-root nodes") doesn't have to
    /// rescan every object on each call.
    pub non_root_nodes: Vec<NodeId>,
    pub stats: Stats,
}

impl AnalyzedSnapshot {
    #[must_use]
    pub fn is_root(&self, id: NodeId) -> bool {
        self.roots.binary_search(&id).is_ok()
    }

    #[must_use]
    pub fn object(&self, id: NodeId) -> Option<&NodeRecord> {
        self.objects.get(id.index() as usize)
    }

    #[must_use]
    pub fn classification_of(&self, id: NodeId) -> Option<Classification> {
        let record = self.object(id)?;
        self.types.iter().find(|t| t.id == record.type_id).map(|t| t.classification)
    }
}

/// Builds the query-ready indices over a raw snapshot.
#[must_use]
pub fn analyze(raw: RawSnapshot) -> AnalyzedSnapshot {
    let RawSnapshot { header, objects, types, references, strings } = raw;

    let type_classification: AHashMap<TypeId, Classification> =
        types.iter().map(|t| (t.id, t.classification)).collect();

    let mut reverse: Vec<ReverseEntry> = references
        .iter()
        .map(|e| ReverseEntry { dst: e.dst, src: e.src, label: e.label.clone() })
        .collect();
    // `sort_by_key` on `Vec` is a stable sort, so edges sharing a `dst`
    // retain their original (traversal-discovery) relative order.
    reverse.sort_by_key(|entry| entry.dst);

    let mut type_members: IndexMap<TypeId, Vec<NodeId>> = IndexMap::new();
    let mut roots = Vec::new();
    let mut stats = Stats::default();
    for object in &objects {
        type_members.entry(object.type_id).or_default().push(object.id);
        stats.total_nodes += 1;
        stats.total_bytes += object.size;
        if let Some(&classification) = type_classification.get(&object.type_id) {
            *stats.per_classification.entry(classification).or_insert(0) += 1;
            if classification.is_root() {
                roots.push(object.id);
            }
        }
    }
    roots.sort_unstable();
    roots.dedup();
    let root_set: std::collections::HashSet<NodeId> = roots.iter().copied().collect();
    let non_root_nodes: Vec<NodeId> = objects.iter().map(|o| o.id).filter(|id| !root_set.contains(id)).collect();

    let mut header = header;
    header.schema_version = SCHEMA_ANALYZED;

    AnalyzedSnapshot {
        analyzed_at_unix: snapshot::now_unix(),
        header,
        objects,
        types,
        references,
        strings,
        reverse,
        type_members,
        roots,
        non_root_nodes,
        stats,
    }
}

/// The part of the analyzed artifact encoded as a single `postcard` blob
/// (everything after the header).
#[derive(Serialize, Deserialize)]
struct Body {
    objects: Vec<NodeRecord>,
    types: Vec<TypeRecord>,
    references: Vec<EdgeRecord>,
    string_values: Vec<Vec<u8>>,
    reverse: Vec<ReverseEntry>,
    type_members: Vec<(TypeId, Vec<NodeId>)>,
    roots: Vec<NodeId>,
    non_root_nodes: Vec<NodeId>,
    stats: Stats,
}

/// Writes the analyzed artifact to `path` in one shot — the indexer is an
/// offline batch pass over an already-complete raw snapshot, not a
/// streaming sink, so there's no batching concern here (`spec.md` §4.3).
pub fn write_analyzed(path: impl AsRef<Path>, snapshot: &AnalyzedSnapshot) -> Result<(), WriterError> {
    let hostname_bytes = snapshot.header.hostname.as_bytes();
    let mut file = File::create(path)?;
    snapshot.header.write_fixed_prefix(&mut file, u32::try_from(hostname_bytes.len()).expect("hostname too long"))?;
    file.write_all(hostname_bytes)?;
    file.write_all(&snapshot.analyzed_at_unix.to_le_bytes())?;

    let string_values: Vec<Vec<u8>> = (0..snapshot.strings.len())
        .map(|i| snapshot.strings.get(crate::ids::StrId::new(u32::try_from(i).expect("string table overflow"))).to_vec())
        .collect();
    let body = Body {
        objects: snapshot.objects.clone(),
        types: snapshot.types.clone(),
        references: snapshot.references.clone(),
        string_values,
        reverse: snapshot.reverse.clone(),
        type_members: snapshot.type_members.iter().map(|(k, v)| (*k, v.clone())).collect(),
        roots: snapshot.roots.clone(),
        non_root_nodes: snapshot.non_root_nodes.clone(),
        stats: snapshot.stats.clone(),
    };
    let encoded = postcard::to_allocvec(&body)?;
    file.write_all(&encoded)?;
    file.flush()?;
    tracing::info!(
        nodes = snapshot.stats.total_nodes,
        bytes = snapshot.stats.total_bytes,
        roots = snapshot.roots.len(),
        "analyzed snapshot written"
    );
    Ok(())
}

/// Reads an analyzed artifact, rejecting anything that hasn't been through
/// [`analyze`] (`spec.md` §6: "A snapshot without the analysis marker is
/// rejected by the query engine with a diagnostic instructing the user to
/// run the analysis pass").
pub fn read_analyzed(path: impl AsRef<Path>) -> Result<AnalyzedSnapshot, QueryError> {
    let mut file = File::open(path)?;
    let header = Header::read(&mut file)?;
    if header.schema_version != SCHEMA_ANALYZED {
        return Err(QueryError::SchemaMismatch { found: header.schema_version, expected: SCHEMA_ANALYZED });
    }
    if header.format_version != FORMAT_VERSION {
        return Err(QueryError::SchemaMismatch { found: header.format_version, expected: FORMAT_VERSION });
    }
    if header.incomplete {
        // `spec.md` §7: "query engine may still open in read-only degraded
        // mode" — surfaced to the caller via `header.incomplete`, not a hard
        // error. Callers that require a guaranteed-complete graph can check
        // it and bail with `QueryError::SnapshotIncomplete` themselves.
        tracing::warn!("opening an incomplete snapshot in degraded mode");
    }
    let analyzed_at_unix = snapshot::read_u64(&mut file)?;
    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;
    let body: Body = postcard::from_bytes(&rest)?;

    let mut strings = StringTable::new();
    for value in body.string_values {
        strings.intern(value);
    }

    Ok(AnalyzedSnapshot {
        header,
        analyzed_at_unix,
        objects: body.objects,
        types: body.types,
        references: body.references,
        strings,
        reverse: body.reverse,
        type_members: body.type_members.into_iter().collect(),
        roots: body.roots,
        non_root_nodes: body.non_root_nodes,
        stats: body.stats,
    })
}
