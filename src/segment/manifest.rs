//! Segment manifest for tracking on-disk segments
//!
//! The manifest is the stored list of sealed segments in sequence order,
//! plus the id and patch generation counters. Readers never see a manifest
//! directly; they get a [`SegmentSequence`] published through a
//! [`SequenceHolder`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sequence::SegmentSequence;
use super::types::{SegmentData, SegmentId, SegmentKind};
use crate::config::SegmentIdSpace;
use crate::error::Result;

/// Manifest entry for a segment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: SegmentId,
    pub doc_count: u32,
    /// Doc count of the sub-view, if the segment has one
    #[serde(default)]
    pub sub_doc_count: Option<u32>,
    /// CRC32 over the segment's attribute files
    pub checksum: u64,
}

impl ManifestEntry {
    pub fn new(id: SegmentId, doc_count: u32) -> Self {
        Self {
            id,
            doc_count,
            sub_doc_count: None,
            checksum: 0,
        }
    }

    pub fn with_checksum(mut self, checksum: u64) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_sub_doc_count(mut self, sub_doc_count: u32) -> Self {
        self.sub_doc_count = Some(sub_doc_count);
        self
    }

    /// The entry as an on-disk sequence input
    pub fn to_segment_data(&self) -> SegmentData {
        let data = SegmentData::new(self.id, SegmentKind::OnDisk, self.doc_count);
        match self.sub_doc_count {
            Some(sub) => data.with_sub_segment(sub),
            None => data,
        }
    }
}

/// The segment manifest tracks all sealed segments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest version (for format upgrades)
    pub version: u32,
    /// Generation number (incremented on each update)
    pub generation: u64,
    /// Next segment ID to allocate
    pub next_segment_id: SegmentId,
    /// Next patch file generation to allocate
    #[serde(default)]
    pub next_patch_generation: u64,
    /// On-disk segments in sequence order
    pub segments: Vec<ManifestEntry>,
    /// Timestamp of last update
    pub updated_at: u64,
}

impl SegmentManifest {
    /// Current manifest format version
    pub const VERSION: u32 = 1;

    /// Create a new empty manifest
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(0),
            next_patch_generation: 0,
            segments: Vec::new(),
            updated_at: 0,
        }
    }

    /// Allocate a new segment ID
    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment_id;
        self.next_segment_id = id.next();
        id
    }

    /// Allocate the generation number for a new batch of patch files
    pub fn allocate_patch_generation(&mut self) -> u64 {
        let generation = self.next_patch_generation;
        self.next_patch_generation += 1;
        self.touch();
        generation
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.updated_at = current_timestamp();
    }

    /// Append a sealed segment
    pub fn add_segment(&mut self, entry: ManifestEntry) {
        if entry.id >= self.next_segment_id {
            self.next_segment_id = entry.id.next();
        }
        self.segments.push(entry);
        self.touch();
    }

    /// Remove a segment from the manifest (after merge)
    pub fn remove_segment(&mut self, segment_id: SegmentId) -> Option<ManifestEntry> {
        let pos = self.segments.iter().position(|e| e.id == segment_id)?;
        self.touch();
        Some(self.segments.remove(pos))
    }

    /// Get total document count across all segments
    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.doc_count as u64).sum()
    }

    /// Get segments count
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Check if manifest is empty
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get segment entry by ID
    pub fn get_segment(&self, segment_id: SegmentId) -> Option<&ManifestEntry> {
        self.segments.iter().find(|e| e.id == segment_id)
    }

    /// Iterate over segment entries
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.segments.iter()
    }

    /// On-disk part of a sequence
    pub fn on_disk_segments(&self) -> Vec<SegmentData> {
        self.segments.iter().map(ManifestEntry::to_segment_data).collect()
    }

    /// Sequence of the on-disk segments alone
    pub fn to_sequence(&self, id_space: SegmentIdSpace) -> Result<SegmentSequence> {
        SegmentSequence::init(id_space, self.on_disk_segments(), Vec::new(), None)
    }

    /// Serialize the manifest to JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize manifest from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serialize the manifest to bincode (more compact)
    pub fn to_bincode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize manifest from bincode
    pub fn from_bincode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes immutable sequences to readers with atomic swaps
pub struct SequenceHolder {
    inner: arc_swap::ArcSwap<SegmentSequence>,
}

impl SequenceHolder {
    pub fn new(sequence: SegmentSequence) -> Self {
        Self {
            inner: arc_swap::ArcSwap::from_pointee(sequence),
        }
    }

    /// Get the current sequence
    pub fn load(&self) -> arc_swap::Guard<Arc<SegmentSequence>> {
        self.inner.load()
    }

    /// Get an owned handle to the current sequence
    pub fn load_full(&self) -> Arc<SegmentSequence> {
        self.inner.load_full()
    }

    /// Atomically replace the sequence
    pub fn store(&self, sequence: SegmentSequence) {
        self.inner.store(Arc::new(sequence));
    }

    /// Number of segments in the current sequence
    pub fn segment_count(&self) -> usize {
        self.inner.load().len()
    }
}

impl Default for SequenceHolder {
    fn default() -> Self {
        Self::new(SegmentSequence::empty(SegmentIdSpace::Offline))
    }
}

/// Get current Unix timestamp in seconds
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
