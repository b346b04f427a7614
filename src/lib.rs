pub mod attribute;
pub mod config;
pub mod error;
pub mod patch;
pub mod segment;
pub mod sentinel;
pub mod store;

pub use attribute::{
    AttributeEncoder, EncodeOutcome, MultiStringEncoder, OffsetTable, OffsetWidth,
    PackAttributeFormatter, VarLenAttributeReader, VarLenAttributeWriter, VarLenEncoder,
};
pub use config::{
    AttributeConfig, AttributeSchema, FieldId, PackAttributeConfig, SegmentIdSpace,
    StorageConfig, ValueType,
};
pub use error::{AttrError, Result};
pub use patch::{FieldPatchReader, MergedPatch, PatchFileIterator, PatchFileWriter, PatchMerger, PatchStream};
pub use segment::{
    BuildingSegment, SegmentDescriptor, SegmentId, SegmentKind, SegmentManifest, SegmentSequence,
    SequenceHolder,
};
pub use sentinel::{BucketArray, OrdinalSlot, SentinelSlot, SlotState, TimestampSlot};
pub use store::{AppendStore, ByteStore, FileStore, MemStore, SegmentStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
