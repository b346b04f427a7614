//! Ordered view over on-disk, dumping and building segments
//!
//! A sequence stitches its segments into one global doc id space: on-disk
//! segments first in stored order, then dumping segments in arrival order,
//! then the building segment if any. Base doc ids are prefix sums of the
//! preceding doc counts and are computed once when the sequence is built.
//!
//! Sequences are immutable. A writer that adds documents to its
//! [`BuildingSegment`](super::BuildingSegment) takes a new snapshot and
//! builds a new sequence; readers keep the one they loaded.

use std::collections::HashSet;

use tracing::info;

use super::types::{SegmentData, SegmentDescriptor, SegmentId, SegmentKind};
use crate::config::SegmentIdSpace;
use crate::error::{AttrError, Result};

/// Immutable, globally addressable list of segments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentSequence {
    id_space: SegmentIdSpace,
    segments: Vec<SegmentData>,
    descriptors: Vec<SegmentDescriptor>,
    total_doc_count: u64,
    next_building_id: SegmentId,
}

fn check_kind(segment: &SegmentData, expected: SegmentKind) -> Result<()> {
    if segment.kind != expected {
        return Err(AttrError::InvalidRequest(format!(
            "{} is {} but was passed as {}",
            segment.id, segment.kind, expected
        )));
    }
    Ok(())
}

impl SegmentSequence {
    /// Build a sequence from its three segment groups
    pub fn init(
        id_space: SegmentIdSpace,
        on_disk: Vec<SegmentData>,
        dumping: Vec<SegmentData>,
        building: Option<SegmentData>,
    ) -> Result<Self> {
        for segment in &on_disk {
            check_kind(segment, SegmentKind::OnDisk)?;
        }
        for segment in &dumping {
            check_kind(segment, SegmentKind::Dumping)?;
        }
        if let Some(segment) = &building {
            check_kind(segment, SegmentKind::Building)?;
        }

        let next_building_id = Self::compute_next_building_id(id_space, &on_disk, &dumping, building.as_ref());

        let mut segments = on_disk;
        segments.extend(dumping);
        segments.extend(building);

        let sequence = Self::from_ordered(id_space, segments, next_building_id)?;
        info!(
            segments = sequence.len(),
            total_docs = sequence.total_doc_count,
            next_building_id = %sequence.next_building_id,
            "initialized segment sequence"
        );
        Ok(sequence)
    }

    fn from_ordered(
        id_space: SegmentIdSpace,
        segments: Vec<SegmentData>,
        next_building_id: SegmentId,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(segments.len());
        let mut descriptors = Vec::with_capacity(segments.len());
        let mut base_doc_id = 0u64;

        for segment in &segments {
            if !seen.insert(segment.id) {
                return Err(AttrError::InvalidRequest(format!(
                    "{} appears twice in one sequence",
                    segment.id
                )));
            }
            descriptors.push(SegmentDescriptor {
                id: segment.id,
                kind: segment.kind,
                doc_count: segment.doc_count,
                base_doc_id,
            });
            base_doc_id += segment.doc_count as u64;
        }

        Ok(Self {
            id_space,
            segments,
            descriptors,
            total_doc_count: base_doc_id,
            next_building_id,
        })
    }

    /// Successor of the newest in-memory segment, else of the newest on-disk
    /// segment, never below the id space's start
    fn compute_next_building_id(
        id_space: SegmentIdSpace,
        on_disk: &[SegmentData],
        dumping: &[SegmentData],
        building: Option<&SegmentData>,
    ) -> SegmentId {
        let in_memory = dumping.iter().chain(building).map(|s| s.id).max();
        let latest = in_memory.or_else(|| on_disk.iter().map(|s| s.id).max());
        let start = id_space.start();
        match latest {
            Some(id) => SegmentId::new((id.0 + 1).max(start)),
            None => SegmentId::new(start),
        }
    }

    /// Empty sequence of an id space
    pub fn empty(id_space: SegmentIdSpace) -> Self {
        Self {
            id_space,
            segments: Vec::new(),
            descriptors: Vec::new(),
            total_doc_count: 0,
            next_building_id: SegmentId::new(id_space.start()),
        }
    }

    pub fn id_space(&self) -> SegmentIdSpace {
        self.id_space
    }

    /// Descriptors in sequence order
    pub fn iter(&self) -> impl Iterator<Item = &SegmentDescriptor> {
        self.descriptors.iter()
    }

    pub fn descriptors(&self) -> &[SegmentDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn total_doc_count(&self) -> u64 {
        self.total_doc_count
    }

    /// Id to give the next building segment
    pub fn next_building_id(&self) -> SegmentId {
        self.next_building_id
    }

    pub fn segment(&self, id: SegmentId) -> Option<&SegmentDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// Segment holding `global_doc_id`, with the doc's local ordinal
    pub fn locate(&self, global_doc_id: u64) -> Option<(&SegmentDescriptor, u32)> {
        let index = self
            .descriptors
            .partition_point(|d| d.end_doc_id() <= global_doc_id);
        let desc = self.descriptors.get(index)?;
        if !desc.contains(global_doc_id) {
            return None;
        }
        Some((desc, (global_doc_id - desc.base_doc_id) as u32))
    }

    /// Global doc id of `local` in segment `id`
    pub fn to_global(&self, id: SegmentId, local: u32) -> Option<u64> {
        let desc = self.segment(id)?;
        (local < desc.doc_count).then(|| desc.base_doc_id + local as u64)
    }

    /// Sequence over every segment's sub-view.
    ///
    /// Returns None if any segment has no sub-view; a partial sequence would
    /// misnumber every document after the gap.
    pub fn sub_sequence(&self) -> Option<SegmentSequence> {
        let subs = self
            .segments
            .iter()
            .map(|s| s.sub_segment.as_deref().cloned())
            .collect::<Option<Vec<SegmentData>>>()?;
        Self::from_ordered(self.id_space, subs, self.next_building_id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::BuildingSegment;

    #[test]
    fn test_base_doc_ids() {
        let mut building = BuildingSegment::new(SegmentId::new(3));
        building.add_docs(5);

        let sequence = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::on_disk(0, 100), SegmentData::on_disk(1, 50)],
            vec![SegmentData::dumping(2, 10)],
            Some(building.snapshot()),
        )
        .unwrap();

        let bases: Vec<u64> = sequence.iter().map(|d| d.base_doc_id).collect();
        assert_eq!(bases, vec![0, 100, 150, 160]);
        assert_eq!(sequence.total_doc_count(), 165);
        assert_eq!(sequence.next_building_id(), SegmentId::new(4));

        // More docs in the building segment do not move the allocated id
        building.add_docs(1);
        assert_eq!(sequence.next_building_id(), SegmentId::new(4));
        assert_eq!(sequence.total_doc_count(), 165);
    }

    #[test]
    fn test_locate() {
        let sequence = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![
                SegmentData::on_disk(0, 100),
                SegmentData::on_disk(1, 0),
                SegmentData::on_disk(2, 50),
            ],
            Vec::new(),
            None,
        )
        .unwrap();

        let (desc, local) = sequence.locate(0).unwrap();
        assert_eq!((desc.id, local), (SegmentId::new(0), 0));
        let (desc, local) = sequence.locate(100).unwrap();
        assert_eq!((desc.id, local), (SegmentId::new(2), 0));
        let (desc, local) = sequence.locate(149).unwrap();
        assert_eq!((desc.id, local), (SegmentId::new(2), 49));
        assert!(sequence.locate(150).is_none());

        assert_eq!(sequence.to_global(SegmentId::new(2), 7), Some(107));
        assert_eq!(sequence.to_global(SegmentId::new(2), 50), None);
    }

    #[test]
    fn test_next_building_id_rules() {
        // Only on-disk segments
        let sequence = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::on_disk(7, 1), SegmentData::on_disk(3, 1)],
            Vec::new(),
            None,
        )
        .unwrap();
        assert_eq!(sequence.next_building_id(), SegmentId::new(8));

        // Dumping segments take precedence over on-disk ones
        let sequence = SegmentSequence::init(
            SegmentIdSpace::Online,
            vec![SegmentData::on_disk(9, 1)],
            vec![SegmentData::dumping(0x4000_0002, 1)],
            None,
        )
        .unwrap();
        assert_eq!(sequence.next_building_id(), SegmentId::new(0x4000_0003));

        // Online space never hands out offline ids
        let sequence = SegmentSequence::init(
            SegmentIdSpace::Online,
            vec![SegmentData::on_disk(9, 1)],
            Vec::new(),
            None,
        )
        .unwrap();
        assert_eq!(sequence.next_building_id(), SegmentId::new(0x4000_0000));

        assert_eq!(
            SegmentSequence::empty(SegmentIdSpace::Offline).next_building_id(),
            SegmentId::new(0)
        );
    }

    #[test]
    fn test_init_validation() {
        let wrong_kind = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::dumping(0, 1)],
            Vec::new(),
            None,
        );
        assert!(wrong_kind.is_err());

        let duplicate = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::on_disk(0, 1)],
            vec![SegmentData::dumping(0, 1)],
            None,
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_sub_sequence() {
        let sequence = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::on_disk(0, 10).with_sub_segment(30)],
            vec![SegmentData::dumping(1, 5).with_sub_segment(7)],
            None,
        )
        .unwrap();
        let sub = sequence.sub_sequence().unwrap();
        let bases: Vec<u64> = sub.iter().map(|d| d.base_doc_id).collect();
        assert_eq!(bases, vec![0, 30]);
        assert_eq!(sub.total_doc_count(), 37);

        let partial = SegmentSequence::init(
            SegmentIdSpace::Offline,
            vec![SegmentData::on_disk(0, 10).with_sub_segment(30)],
            vec![SegmentData::dumping(1, 5)],
            None,
        )
        .unwrap();
        assert!(partial.sub_sequence().is_none());
    }
}
