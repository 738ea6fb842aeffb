//! The Snapshot Writer (`spec.md` §4.2) and the raw artifact's on-disk
//! layout.
//!
//! The four logical tables (`object`, `type`, `reference`, `string`) are not
//! stored as one big blob: each [`SnapshotWriter::push_object`] /
//! [`push_type`](SnapshotWriter::push_type) /
//! [`push_edge`](SnapshotWriter::push_edge) call buffers into a per-table
//! batch, and the batch is flushed to disk as a length-prefixed `postcard`
//! section once it reaches [`BATCH_SIZE`] records — matching §5's "the
//! snapshot writer must not buffer unboundedly: records are flushed in
//! fixed-size batches". Because batches interleave freely in the file
//! (tagged by table), a reader can recover everything flushed so far even if
//! the writer never reaches `finish()` — the header's `incomplete` flag
//! (`spec.md` §4.2) starts `true` and is only flipped by `finish()`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, WriterError};
use crate::ids::StrId;
use crate::model::{EdgeRecord, NodeRecord, TypeRecord};
use crate::strings::StringTable;

const MAGIC: [u8; 4] = *b"OBJX";
pub const FORMAT_VERSION: u32 = 1;
pub const SCHEMA_RAW: u32 = 0;
pub const SCHEMA_ANALYZED: u32 = 1;

/// Records flushed per batch before the writer forces a write
/// (`spec.md` §5, "fixed-size batches").
pub const BATCH_SIZE: usize = 4096;

/// The header row carried by every artifact (`spec.md` §6: "A header row
/// records: capture timestamp, capturing hostname, target process RSS at
/// capture, and a format-version integer").
#[derive(Debug, Clone)]
pub struct Header {
    pub format_version: u32,
    /// `0` for a raw snapshot, bumped to [`SCHEMA_ANALYZED`] once the
    /// Analysis Indexer has run (`spec.md` §4.3, §6).
    pub schema_version: u32,
    /// Set while the writer has not yet called `finish()`
    /// (`spec.md` §4.2: "a partial snapshot is still analyzable, marked
    /// incomplete via a header flag").
    pub incomplete: bool,
    pub captured_at_unix: u64,
    pub hostname: String,
    pub target_rss_bytes: u64,
    pub node_count: u64,
    pub edge_count: u64,
    pub type_count: u64,
    pub string_count: u64,
}

impl Header {
    pub(crate) fn write_fixed_prefix<W: Write>(&self, w: &mut W, hostname_len: u32) -> io::Result<()> {
        w.write_all(&MAGIC)?;
        w.write_all(&self.format_version.to_le_bytes())?;
        w.write_all(&self.schema_version.to_le_bytes())?;
        w.write_all(&[u8::from(self.incomplete), 0, 0, 0])?;
        w.write_all(&self.captured_at_unix.to_le_bytes())?;
        w.write_all(&self.target_rss_bytes.to_le_bytes())?;
        w.write_all(&self.node_count.to_le_bytes())?;
        w.write_all(&self.edge_count.to_le_bytes())?;
        w.write_all(&self.type_count.to_le_bytes())?;
        w.write_all(&self.string_count.to_le_bytes())?;
        w.write_all(&hostname_len.to_le_bytes())?;
        Ok(())
    }

    pub(crate) fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an objex snapshot (bad magic)"));
        }
        let format_version = read_u32(r)?;
        let schema_version = read_u32(r)?;
        let mut incomplete_pad = [0u8; 4];
        r.read_exact(&mut incomplete_pad)?;
        let incomplete = incomplete_pad[0] != 0;
        let captured_at_unix = read_u64(r)?;
        let target_rss_bytes = read_u64(r)?;
        let node_count = read_u64(r)?;
        let edge_count = read_u64(r)?;
        let type_count = read_u64(r)?;
        let string_count = read_u64(r)?;
        let hostname_len = read_u32(r)?;
        let mut hostname_bytes = vec![0u8; hostname_len as usize];
        r.read_exact(&mut hostname_bytes)?;
        let hostname = String::from_utf8_lossy(&hostname_bytes).into_owned();
        Ok(Self {
            format_version,
            schema_version,
            incomplete,
            captured_at_unix,
            hostname,
            target_rss_bytes,
            node_count,
            edge_count,
            type_count,
            string_count,
        })
    }
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

pub(crate) fn hostname() -> String {
    // No ambient config crate for this (`spec.md` §10): a bare hostname
    // lookup has no portable stdlib API, so fall back to an environment
    // variable the same way a capture CLI running under a shell would.
    std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")).unwrap_or_else(|_| "unknown".to_owned())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum BatchTag {
    Object,
    Type,
    Reference,
    String,
}

fn write_batch<W: Write, T: Serialize>(w: &mut W, tag: BatchTag, items: &[T]) -> Result<(), WriterError> {
    let tag_byte: u8 = match tag {
        BatchTag::Object => 0,
        BatchTag::Type => 1,
        BatchTag::Reference => 2,
        BatchTag::String => 3,
    };
    let body = postcard::to_allocvec(items)?;
    w.write_all(&[tag_byte])?;
    w.write_all(&(u32::try_from(body.len()).expect("batch too large")).to_le_bytes())?;
    w.write_all(&body)?;
    Ok(())
}

/// A streaming sink for the Traversal Engine (`spec.md` §4.2 contract).
pub struct SnapshotWriter {
    file: File,
    strings: StringTable,
    flushed_string_count: usize,
    pending_objects: Vec<NodeRecord>,
    pending_types: Vec<TypeRecord>,
    pending_edges: Vec<EdgeRecord>,
    node_count: u64,
    edge_count: u64,
    type_count: u64,
    target_rss_bytes: u64,
    finished: bool,
}

impl SnapshotWriter {
    /// Opens `path` for writing and persists a provisional header with
    /// `incomplete = true`. `target_rss_bytes` is the capturing process's
    /// RSS at the moment capture started, per `spec.md` §6.
    pub fn create(path: impl AsRef<Path>, target_rss_bytes: u64) -> Result<Self, CaptureError> {
        let mut file = File::create(path)?;
        let header = Header {
            format_version: FORMAT_VERSION,
            schema_version: SCHEMA_RAW,
            incomplete: true,
            captured_at_unix: now_unix(),
            hostname: hostname(),
            target_rss_bytes,
            node_count: 0,
            edge_count: 0,
            type_count: 0,
            string_count: 0,
        };
        let hostname_bytes = header.hostname.as_bytes();
        header.write_fixed_prefix(&mut file, u32::try_from(hostname_bytes.len()).expect("hostname too long"))?;
        file.write_all(hostname_bytes)?;
        file.flush()?;
        tracing::info!(target_rss_bytes, "snapshot writer opened");
        Ok(Self {
            file,
            strings: StringTable::new(),
            flushed_string_count: 0,
            pending_objects: Vec::new(),
            pending_types: Vec::new(),
            pending_edges: Vec::new(),
            node_count: 0,
            edge_count: 0,
            type_count: 0,
            target_rss_bytes,
            finished: false,
        })
    }

    /// Interns a label/preview/name into this snapshot's string table.
    pub fn intern(&mut self, value: impl AsRef<[u8]>) -> StrId {
        self.strings.intern(value)
    }

    pub fn push_object(&mut self, record: NodeRecord) -> Result<(), CaptureError> {
        self.node_count += 1;
        self.pending_objects.push(record);
        if self.pending_objects.len() >= BATCH_SIZE {
            self.flush_objects()?;
            self.flush_strings()?;
        }
        Ok(())
    }

    pub fn push_type(&mut self, record: TypeRecord) -> Result<(), CaptureError> {
        self.type_count += 1;
        self.pending_types.push(record);
        if self.pending_types.len() >= BATCH_SIZE {
            self.flush_types()?;
            self.flush_strings()?;
        }
        Ok(())
    }

    pub fn push_edge(&mut self, record: EdgeRecord) -> Result<(), CaptureError> {
        self.edge_count += 1;
        self.pending_edges.push(record);
        if self.pending_edges.len() >= BATCH_SIZE {
            self.flush_edges()?;
            self.flush_strings()?;
        }
        Ok(())
    }

    fn flush_objects(&mut self) -> Result<(), CaptureError> {
        if self.pending_objects.is_empty() {
            return Ok(());
        }
        write_batch(&mut self.file, BatchTag::Object, &self.pending_objects)?;
        tracing::debug!(count = self.pending_objects.len(), "flushed object batch");
        self.pending_objects.clear();
        Ok(())
    }

    fn flush_types(&mut self) -> Result<(), CaptureError> {
        if self.pending_types.is_empty() {
            return Ok(());
        }
        write_batch(&mut self.file, BatchTag::Type, &self.pending_types)?;
        tracing::debug!(count = self.pending_types.len(), "flushed type batch");
        self.pending_types.clear();
        Ok(())
    }

    fn flush_edges(&mut self) -> Result<(), CaptureError> {
        if self.pending_edges.is_empty() {
            return Ok(());
        }
        write_batch(&mut self.file, BatchTag::Reference, &self.pending_edges)?;
        tracing::debug!(count = self.pending_edges.len(), "flushed reference batch");
        self.pending_edges.clear();
        Ok(())
    }

    fn flush_strings(&mut self) -> Result<(), CaptureError> {
        let fresh: Vec<(StrId, Vec<u8>)> =
            self.strings.iter_from(self.flushed_string_count).map(|(id, bytes)| (id, bytes.to_vec())).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        self.flushed_string_count += fresh.len();
        write_batch(&mut self.file, BatchTag::String, &fresh)?;
        tracing::debug!(count = fresh.len(), "flushed string batch");
        Ok(())
    }

    /// Flushes any remaining batches and rewrites the header with final
    /// counts and `incomplete = false`.
    ///
    /// If the writer is dropped instead of calling this, `incomplete` stays
    /// `true` in whatever prefix was last written — the partial file is
    /// still a valid, analyzable snapshot (`spec.md` §4.2).
    pub fn finish(mut self) -> Result<(), CaptureError> {
        self.flush_objects()?;
        self.flush_types()?;
        self.flush_edges()?;
        self.flush_strings()?;
        let header = Header {
            format_version: FORMAT_VERSION,
            schema_version: SCHEMA_RAW,
            incomplete: false,
            captured_at_unix: now_unix(),
            hostname: hostname(),
            target_rss_bytes: self.target_rss_bytes,
            node_count: self.node_count,
            edge_count: self.edge_count,
            type_count: self.type_count,
            string_count: u64::try_from(self.flushed_string_count).expect("string count overflow"),
        };
        self.file.seek(SeekFrom::Start(0))?;
        // The hostname length written here must match what was written at
        // `create()` time, or this rewrite would shift the body. `hostname()`
        // is deterministic within one process invocation, so it does.
        header.write_fixed_prefix(&mut self.file, u32::try_from(header.hostname.len()).expect("hostname too long"))?;
        self.file.flush()?;
        self.finished = true;
        tracing::info!(
            nodes = header.node_count,
            edges = header.edge_count,
            types = header.type_count,
            strings = header.string_count,
            "snapshot finished"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_fixed_prefix_round_trips() {
        let header = Header {
            format_version: FORMAT_VERSION,
            schema_version: SCHEMA_ANALYZED,
            incomplete: true,
            captured_at_unix: 1_700_000_000,
            hostname: "capture-host".to_owned(),
            target_rss_bytes: 123_456,
            node_count: 7,
            edge_count: 9,
            type_count: 2,
            string_count: 11,
        };
        let mut buf = Vec::new();
        header.write_fixed_prefix(&mut buf, u32::try_from(header.hostname.len()).unwrap()).unwrap();
        buf.extend_from_slice(header.hostname.as_bytes());

        let round_tripped = Header::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(round_tripped.format_version, header.format_version);
        assert_eq!(round_tripped.schema_version, header.schema_version);
        assert_eq!(round_tripped.incomplete, header.incomplete);
        assert_eq!(round_tripped.captured_at_unix, header.captured_at_unix);
        assert_eq!(round_tripped.hostname, header.hostname);
        assert_eq!(round_tripped.target_rss_bytes, header.target_rss_bytes);
        assert_eq!(round_tripped.node_count, header.node_count);
        assert_eq!(round_tripped.edge_count, header.edge_count);
        assert_eq!(round_tripped.type_count, header.type_count);
        assert_eq!(round_tripped.string_count, header.string_count);
    }

    #[test]
    fn header_read_rejects_bad_magic() {
        let buf = vec![0u8; 64];
        let err = Header::read(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

/// The raw artifact, fully materialized in memory (`spec.md` §4.2's four
/// tables, read back whole). The Analysis Indexer consumes this.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub header: Header,
    pub objects: Vec<NodeRecord>,
    pub types: Vec<TypeRecord>,
    pub references: Vec<EdgeRecord>,
    pub strings: StringTable,
}

/// Reads every batch up to EOF, so a truncated (incomplete) file still
/// yields everything that was flushed before the writer stopped.
pub fn read_raw(path: impl AsRef<Path>) -> Result<RawSnapshot, WriterError> {
    let mut file = File::open(path)?;
    let header = Header::read(&mut file)?;

    let mut objects = Vec::new();
    let mut types = Vec::new();
    let mut references = Vec::new();
    let mut strings = StringTable::new();
    let mut string_entries: Vec<(StrId, Vec<u8>)> = Vec::new();

    loop {
        let mut tag_byte = [0u8; 1];
        match file.read_exact(&mut tag_byte) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(error) => return Err(error.into()),
        }
        let len = read_u32(&mut file)? as usize;
        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;
        match tag_byte[0] {
            0 => objects.extend(postcard::from_bytes::<Vec<NodeRecord>>(&body)?),
            1 => types.extend(postcard::from_bytes::<Vec<TypeRecord>>(&body)?),
            2 => references.extend(postcard::from_bytes::<Vec<EdgeRecord>>(&body)?),
            3 => string_entries.extend(postcard::from_bytes::<Vec<(StrId, Vec<u8>)>>(&body)?),
            other => {
                return Err(WriterError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown batch tag {other}"),
                )));
            }
        }
    }

    string_entries.sort_by_key(|(id, _)| *id);
    for (_, bytes) in string_entries {
        strings.intern(bytes);
    }

    Ok(RawSnapshot { header, objects, types, references, strings })
}
