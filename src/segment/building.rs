//! The segment currently receiving documents
//!
//! Exactly one writer owns a `BuildingSegment`; mutation needs `&mut self`.
//! Readers never see the live value, only a [`SegmentData`] snapshot taken at
//! a document-count boundary.

use super::types::{SegmentData, SegmentId, SegmentKind};
use crate::error::{AttrError, Result};

#[derive(Debug)]
pub struct BuildingSegment {
    id: SegmentId,
    doc_count: u32,
    /// Docs in the sub-view, when the segment has one
    sub_doc_count: Option<u32>,
}

impl BuildingSegment {
    pub fn new(id: SegmentId) -> Self {
        Self {
            id,
            doc_count: 0,
            sub_doc_count: None,
        }
    }

    /// Building segment that also maintains a sub-view
    pub fn with_sub_segment(id: SegmentId) -> Self {
        Self {
            id,
            doc_count: 0,
            sub_doc_count: Some(0),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Add one document, returning its local ordinal
    pub fn add_doc(&mut self) -> u32 {
        let ordinal = self.doc_count;
        self.doc_count += 1;
        ordinal
    }

    pub fn add_docs(&mut self, count: u32) {
        self.doc_count += count;
    }

    /// Add documents to the sub-view
    pub fn add_sub_docs(&mut self, count: u32) -> Result<()> {
        match self.sub_doc_count.as_mut() {
            Some(sub) => {
                *sub += count;
                Ok(())
            }
            None => Err(AttrError::InvalidRequest(format!(
                "{} has no sub-segment",
                self.id
            ))),
        }
    }

    /// Immutable view at the current document count
    pub fn snapshot(&self) -> SegmentData {
        let mut data = SegmentData::new(self.id, SegmentKind::Building, self.doc_count);
        if let Some(sub) = self.sub_doc_count {
            data = data.with_sub_segment(sub);
        }
        data
    }

    /// Seal into a dumping segment
    pub fn into_dumping(self) -> SegmentData {
        let mut data = self.snapshot();
        data.kind = SegmentKind::Dumping;
        if let Some(sub) = data.sub_segment.as_mut() {
            sub.kind = SegmentKind::Dumping;
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_frozen() {
        let mut building = BuildingSegment::new(SegmentId::new(5));
        assert_eq!(building.add_doc(), 0);
        assert_eq!(building.add_doc(), 1);

        let snapshot = building.snapshot();
        building.add_docs(3);

        assert_eq!(snapshot.doc_count, 2);
        assert_eq!(snapshot.kind, SegmentKind::Building);
        assert_eq!(building.doc_count(), 5);
    }

    #[test]
    fn test_sub_segment() {
        let mut plain = BuildingSegment::new(SegmentId::new(1));
        assert!(plain.add_sub_docs(1).is_err());
        assert!(plain.snapshot().sub_segment.is_none());

        let mut nested = BuildingSegment::with_sub_segment(SegmentId::new(2));
        nested.add_doc();
        nested.add_sub_docs(4).unwrap();
        let dumping = nested.into_dumping();
        assert_eq!(dumping.kind, SegmentKind::Dumping);
        let sub = dumping.sub_segment.unwrap();
        assert_eq!(sub.doc_count, 4);
        assert_eq!(sub.kind, SegmentKind::Dumping);
    }
}
