//! The Query Engine (`spec.md` §4.4): `lookup`, `outbound`, `inbound`,
//! `random`, `paths_to_roots`, `stats`, served over an [`AnalyzedSnapshot`].
//!
//! Every method borrows `&self` only — `spec.md` §5: "The Query Engine
//! itself is stateless per call; an external shell layers a cursor, history,
//! and marks on top of it." `random()` takes the caller's RNG rather than
//! owning one, for the same reason.

use ahash::{AHashMap, AHashSet};
use rand::Rng;

use crate::error::QueryError;
use crate::ids::NodeId;
use crate::index::{AnalyzedSnapshot, Stats};
use crate::model::{Classification, EdgeLabel};

/// Default cap on the retention-path search's visited frontier
/// (`spec.md` §4.4: "caps visited-frontier size at a configurable limit
/// (default 1,000,000 nodes)").
pub const DEFAULT_PATH_BUDGET: usize = 1_000_000;

/// A node summary as handed to the shell (`spec.md` §6: "classification,
/// type name, id, size, refcount, and preview where available, formatted
/// as `<typename#id>`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub classification: Classification,
    pub type_name: String,
    pub size: u64,
    pub refcount: u64,
    pub len: Option<u64>,
    pub preview: Option<String>,
}

impl std::fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}#{}>", self.type_name, self.id.index())
    }
}

/// A resolved outbound or inbound edge, with the label rendered to text and
/// the neighbor's summary attached so a shell can display it without a
/// follow-up `lookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeView {
    pub label: String,
    pub node: NodeId,
    pub summary: NodeSummary,
}

/// One root-to-target retention path (`spec.md` §4.4: "label-paths from any
/// root to `id`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPath {
    /// Node ids from the root (index 0) to the target (last), inclusive.
    pub nodes: Vec<NodeId>,
    /// Edge labels, rendered to text; `labels.len() == nodes.len() - 1`.
    pub labels: Vec<String>,
}

impl RetentionPath {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The three-way termination classification from `spec.md` §4.4: "A separate
/// classification of terminations distinguishes 'reachable from a module',
/// 'reachable only from a frame', and 'no root reachable within budget'."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ModuleReachable,
    FrameOnly,
    NoRootReachable,
}

/// The result of a `paths_to_roots` call. `budget_exhausted` is the
/// "distinguishes... from budget exhausted" marker from `spec.md` §7: it can
/// be `true` alongside an empty `paths` list, which is a different outcome
/// from a search that completed and legitimately found nothing.
#[derive(Debug, Clone)]
pub struct PathsResult {
    pub paths: Vec<RetentionPath>,
    pub termination: Termination,
    pub budget_exhausted: bool,
}

/// Read-only handle over an indexed snapshot.
pub struct QueryEngine<'a> {
    snapshot: &'a AnalyzedSnapshot,
}

impl<'a> QueryEngine<'a> {
    #[must_use]
    pub fn new(snapshot: &'a AnalyzedSnapshot) -> Self {
        Self { snapshot }
    }

    fn summarize(&self, id: NodeId) -> Option<NodeSummary> {
        let record = self.snapshot.object(id)?;
        let type_name = self
            .snapshot
            .types
            .iter()
            .find(|t| t.id == record.type_id)
            .map(|t| self.snapshot.strings.get_str(t.name))
            .unwrap_or_else(|| "?".to_owned());
        let classification = self.snapshot.classification_of(id).unwrap_or(Classification::OtherBuiltin);
        Some(NodeSummary {
            id,
            classification,
            type_name,
            size: record.size,
            refcount: record.refcount,
            len: record.len,
            preview: record.preview.map(|sid| self.snapshot.strings.get_str(sid)),
        })
    }

    fn label_text(&self, label: &EdgeLabel) -> String {
        match label {
            EdgeLabel::Attr(sid) => self.snapshot.strings.get_str(*sid),
            EdgeLabel::Key(sid) => self.snapshot.strings.get_str(*sid),
            EdgeLabel::KeyNode(_) => "<key>".to_owned(),
            EdgeLabel::Index(i) => i.to_string(),
            EdgeLabel::Member => "<member>".to_owned(),
        }
    }

    /// `lookup(id) -> node-record-with-edges` (`spec.md` §4.4).
    pub fn lookup(&self, id: NodeId) -> Result<NodeSummary, QueryError> {
        self.summarize(id).ok_or(QueryError::NodeNotFound(id))
    }

    /// `outbound(id) -> list of (label, dst_id, dst_summary)`.
    pub fn outbound(&self, id: NodeId) -> Result<Vec<EdgeView>, QueryError> {
        if self.snapshot.object(id).is_none() {
            return Err(QueryError::NodeNotFound(id));
        }
        Ok(self
            .snapshot
            .references
            .iter()
            .filter(|e| e.src == id)
            .filter_map(|e| {
                let summary = self.summarize(e.dst)?;
                Some(EdgeView { label: self.label_text(&e.label), node: e.dst, summary })
            })
            .collect())
    }

    /// `inbound(id) -> list of (src_id, label, src_summary)`, served from
    /// the reverse index (`spec.md` §4.4).
    pub fn inbound(&self, id: NodeId) -> Result<Vec<EdgeView>, QueryError> {
        if self.snapshot.object(id).is_none() {
            return Err(QueryError::NodeNotFound(id));
        }
        let start = self.snapshot.reverse.partition_point(|e| e.dst < id);
        let mut out = Vec::new();
        for entry in &self.snapshot.reverse[start..] {
            if entry.dst != id {
                break;
            }
            if let Some(summary) = self.summarize(entry.src) {
                out.push(EdgeView { label: self.label_text(&entry.label), node: entry.src, summary });
            }
        }
        Ok(out)
    }

    fn inbound_raw(&self, id: NodeId) -> &[crate::index::ReverseEntry] {
        let start = self.snapshot.reverse.partition_point(|e| e.dst < id);
        let end = start
            + self.snapshot.reverse[start..].iter().take_while(|e| e.dst == id).count();
        &self.snapshot.reverse[start..end]
    }

    /// `random() -> id` uniformly sampled over all non-root nodes
    /// (`spec.md` §4.4). Returns `None` if the snapshot has no non-root
    /// nodes at all.
    pub fn random(&self, rng: &mut impl Rng) -> Option<NodeId> {
        let pool = &self.snapshot.non_root_nodes;
        if pool.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..pool.len());
        Some(pool[index])
    }

    /// `stats()` (`spec.md` §6).
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.snapshot.stats
    }

    /// `paths_to_roots(id, k)` — the central retention query (`spec.md`
    /// §4.4).
    ///
    /// A breadth-first walk over the reverse-edge index, starting at `id`
    /// and expanding through "who points to me" at each step, stopping when
    /// a frontier node is itself a root. `spec.md` calls this "bidirectional"
    /// in the sense that it searches backward from the target toward the
    /// roots rather than forward enumerating the whole graph from every
    /// root; the traversal itself is a single-direction BFS over the
    /// reverse adjacency. The visited set guarantees termination on cyclic
    /// graphs (`spec.md` §4.4, "Cycle handling").
    pub fn paths_to_roots(&self, id: NodeId, k: usize, budget: usize) -> Result<PathsResult, QueryError> {
        if self.snapshot.object(id).is_none() {
            return Err(QueryError::NodeNotFound(id));
        }

        let mut visited: AHashSet<NodeId> = AHashSet::new();
        visited.insert(id);
        // `next_hop[n] = (m, label)` means the shortest discovered path from
        // `n` forward to `id` starts by stepping to `m` via `label`.
        let mut next_hop: AHashMap<NodeId, (NodeId, EdgeLabel)> = AHashMap::new();
        let mut frontier = vec![id];
        let mut root_hits: Vec<NodeId> = Vec::new();
        let mut budget_exhausted = false;

        'search: while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for &cur in &frontier {
                for entry in self.inbound_raw(cur) {
                    if visited.len() >= budget {
                        budget_exhausted = true;
                        break 'search;
                    }
                    if visited.insert(entry.src) {
                        next_hop.insert(entry.src, (cur, entry.label.clone()));
                        if self.snapshot.is_root(entry.src) {
                            root_hits.push(entry.src);
                        } else {
                            next_frontier.push(entry.src);
                        }
                    }
                }
            }
            if root_hits.len() >= k.max(1) && !root_hits.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        let mut candidates: Vec<RetentionPath> = root_hits
            .iter()
            .map(|&root| self.reconstruct_path(root, id, &next_hop))
            .collect();

        // `spec.md` §4.4: "prefers the `module` classification for terminal
        // selection... ties are broken by (shortest length, then
        // lexicographic label sequence)".
        candidates.sort_by(|a, b| {
            let a_root_is_module = self.snapshot.classification_of(a.nodes[0]) == Some(Classification::Module);
            let b_root_is_module = self.snapshot.classification_of(b.nodes[0]) == Some(Classification::Module);
            b_root_is_module
                .cmp(&a_root_is_module)
                .then_with(|| a.len().cmp(&b.len()))
                .then_with(|| a.labels.cmp(&b.labels))
        });
        candidates.truncate(k);

        let termination = if candidates.iter().any(|p| self.snapshot.classification_of(p.nodes[0]) == Some(Classification::Module))
        {
            Termination::ModuleReachable
        } else if !candidates.is_empty() {
            Termination::FrameOnly
        } else {
            Termination::NoRootReachable
        };

        Ok(PathsResult { paths: candidates, termination, budget_exhausted })
    }

    fn reconstruct_path(
        &self,
        root: NodeId,
        target: NodeId,
        next_hop: &AHashMap<NodeId, (NodeId, EdgeLabel)>,
    ) -> RetentionPath {
        let mut nodes = vec![root];
        let mut labels = Vec::new();
        let mut cur = root;
        while cur != target {
            let (next, label) = &next_hop[&cur];
            labels.push(self.label_text(label));
            nodes.push(*next);
            cur = *next;
        }
        RetentionPath { nodes, labels }
    }
}
