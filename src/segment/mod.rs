//! Segment sequencing
//!
//! Presents on-disk, dumping and building segments to readers as one
//! ordered, globally doc-id-addressable sequence.
//!
//! # Architecture
//!
//! - `SegmentSequence`: immutable ordered view with base doc ids
//! - `BuildingSegment`: the writer-owned segment receiving documents
//! - `SegmentManifest`: stored list of sealed segments
//! - `SequenceHolder`: atomic publication of sequences to readers

mod types;
mod sequence;
mod building;
mod manifest;

pub use types::*;
pub use sequence::*;
pub use building::*;
pub use manifest::*;
