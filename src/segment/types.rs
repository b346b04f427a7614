//! Core types for segment sequencing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// Lifecycle stage of a segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Sealed and listed in the manifest
    OnDisk,
    /// Flushed from memory, not yet in the manifest
    Dumping,
    /// Currently receiving documents
    Building,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::OnDisk => "on-disk",
            SegmentKind::Dumping => "dumping",
            SegmentKind::Building => "building",
        };
        f.write_str(name)
    }
}

/// A segment as handed to the sequencer.
///
/// `sub_segment` is the optional secondary document view (for example a
/// nested-document sub-index) covering the same segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentData {
    pub id: SegmentId,
    pub kind: SegmentKind,
    pub doc_count: u32,
    #[serde(default)]
    pub sub_segment: Option<Box<SegmentData>>,
}

impl SegmentData {
    pub fn new(id: SegmentId, kind: SegmentKind, doc_count: u32) -> Self {
        Self {
            id,
            kind,
            doc_count,
            sub_segment: None,
        }
    }

    pub fn on_disk(id: u64, doc_count: u32) -> Self {
        Self::new(SegmentId::new(id), SegmentKind::OnDisk, doc_count)
    }

    pub fn dumping(id: u64, doc_count: u32) -> Self {
        Self::new(SegmentId::new(id), SegmentKind::Dumping, doc_count)
    }

    /// Attach a sub-view of `sub_doc_count` documents
    pub fn with_sub_segment(mut self, sub_doc_count: u32) -> Self {
        self.sub_segment = Some(Box::new(SegmentData::new(self.id, self.kind, sub_doc_count)));
        self
    }
}

/// A segment's position in a sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub id: SegmentId,
    pub kind: SegmentKind,
    pub doc_count: u32,
    /// Global doc id of the segment's first document
    pub base_doc_id: u64,
}

impl SegmentDescriptor {
    /// One past the last global doc id
    pub fn end_doc_id(&self) -> u64 {
        self.base_doc_id + self.doc_count as u64
    }

    pub fn contains(&self, global_doc_id: u64) -> bool {
        global_doc_id >= self.base_doc_id && global_doc_id < self.end_doc_id()
    }
}
