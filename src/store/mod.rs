//! Byte stores and the on-disk segment layout
//!
//! # Architecture
//!
//! - `ByteStore` / `AppendStore`: the only file interface the core needs
//! - `MemStore`, `FileStore`: in-memory and file-backed implementations
//! - `SegmentStore`: directory layout, attribute and patch files, manifest

mod byte_store;
mod segment_store;

pub use byte_store::*;
pub use segment_store::*;
