//! Error types, split by pipeline stage per `spec.md` §7 ("Error kinds").
//!
//! Each stage gets its own enum in the teacher's `ReplError`/`ResourceError`
//! style (manual `Display` + `std::error::Error`, no `thiserror`): a plain
//! `enum` keeps each variant's payload distinct and lets callers match on
//! kind without string comparison.

use std::fmt;
use std::io;

use crate::ids::NodeId;

/// Failures from the Traversal Engine / Snapshot Writer pipeline
/// (`spec.md` §7: `snapshot-io`).
///
/// Per-object shape failures are *not* represented here — `spec.md` §7 is
/// explicit that those are "captured in the node record and do not abort
/// capture" (see [`crate::model::NodeRecord::shape_extraction_failed`]).
/// `CaptureError` is only for failures that do abort the walk or the flush.
#[derive(Debug)]
pub enum CaptureError {
    /// The destination artifact could not be written.
    Io(io::Error),
    /// A root in the seed set could not be read at all (`spec.md` §4.1,
    /// "A root that is unreadable is skipped with a warning record" — this
    /// variant is for the rarer case where no root survives to seed the
    /// walk).
    NoReadableRoots,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "snapshot-io: {error}"),
            Self::NoReadableRoots => write!(f, "snapshot-io: no readable roots to seed the walk"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<io::Error> for CaptureError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

/// Failures opening or validating a raw or analyzed snapshot artifact.
#[derive(Debug)]
pub enum WriterError {
    Io(io::Error),
    /// `postcard` failed to encode or decode a section.
    Codec(postcard::Error),
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "snapshot-io: {error}"),
            Self::Codec(error) => write!(f, "snapshot-io: malformed artifact ({error})"),
        }
    }
}

impl std::error::Error for WriterError {}

impl From<io::Error> for WriterError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<postcard::Error> for WriterError {
    fn from(error: postcard::Error) -> Self {
        Self::Codec(error)
    }
}

/// Failures surfaced by the Query Engine (`spec.md` §7).
#[derive(Debug)]
pub enum QueryError {
    /// The artifact has not been through the Analysis Indexer
    /// (`spec.md` §6: "A snapshot without the analysis marker is rejected by
    /// the query engine with a diagnostic instructing the user to run the
    /// analysis pass").
    SchemaMismatch { found: u32, expected: u32 },
    /// The artifact's writer was dropped before `finish()`; the header's
    /// `incomplete` flag is set. The query engine still opens it in
    /// read-only degraded mode (`spec.md` §7) but callers that need a
    /// guaranteed-complete graph can treat this as fatal.
    SnapshotIncomplete,
    /// `lookup`/`outbound`/`inbound` was called with an id not present in
    /// the node table.
    NodeNotFound(NodeId),
    /// `paths_to_roots` exhausted its visited-frontier budget before
    /// reaching a root or exhausting the graph.
    BudgetExhausted,
    Io(io::Error),
    Codec(postcard::Error),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaMismatch { found, expected } => write!(
                f,
                "schema-mismatch: artifact is schema version {found}, expected {expected}; run the analysis pass first"
            ),
            Self::SnapshotIncomplete => write!(f, "snapshot-incomplete: capture was not finished cleanly"),
            Self::NodeNotFound(id) => write!(f, "node-not-found: {}", id.index()),
            Self::BudgetExhausted => write!(f, "budget-exhausted: retention query hit its visit cap"),
            Self::Io(error) => write!(f, "{error}"),
            Self::Codec(error) => write!(f, "malformed artifact: {error}"),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<io::Error> for QueryError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<postcard::Error> for QueryError {
    fn from(error: postcard::Error) -> Self {
        Self::Codec(error)
    }
}
