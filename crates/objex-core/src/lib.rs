//! In-process heap snapshot capture and retention-path analysis for
//! dynamic-object runtimes.
//!
//! Four pieces, leaves first, mirroring the four components in `spec.md`
//! §2:
//!
//! - [`runtime`] — the capture target: a `Runtime` trait plus
//!   [`runtime::heap::EmbeddedHeap`], a small dynamic-object heap used by
//!   this crate's own tests and CLI in place of a live interpreter.
//! - [`shape`] — the shape adapter, per-classification enumeration of
//!   outbound references (`spec.md` §4.1).
//! - [`traversal`] — the Traversal Engine and [`traversal::dump_graph`], the
//!   capture entry point (`spec.md` §4.1, §6).
//! - [`snapshot`] — the Snapshot Writer and the raw artifact's on-disk
//!   format (`spec.md` §4.2).
//! - [`index`] — the Analysis Indexer, turning a raw snapshot into a
//!   query-ready artifact (`spec.md` §4.3).
//! - [`query`] — the Query Engine (`spec.md` §4.4).
//!
//! [`model`], [`ids`], and [`strings`] hold the shared data model (`spec.md`
//! §3). [`error`] holds the per-stage error types (`spec.md` §7).

pub mod error;
pub mod ids;
pub mod index;
pub mod model;
pub mod query;
pub mod runtime;
pub mod shape;
pub mod snapshot;
pub mod strings;
pub mod traversal;

pub use error::{CaptureError, QueryError, WriterError};
pub use ids::{NodeId, StrId, TypeId};
pub use index::{analyze, read_analyzed, write_analyzed, AnalyzedSnapshot, Stats};
pub use model::{Classification, EdgeLabel, EdgeRecord, NodeRecord, TypeRecord};
pub use query::{
    EdgeView, NodeSummary, PathsResult, QueryEngine, RetentionPath, Termination, DEFAULT_PATH_BUDGET,
};
pub use runtime::{ObjectData, ObjectId, Roots, Runtime};
pub use snapshot::{read_raw, RawSnapshot, SnapshotWriter};
pub use traversal::{dump_graph, walk, DumpOptions, DEFAULT_PREVIEW_LEN_INSTANCE, DEFAULT_PREVIEW_LEN_STRING};
