//! Out-of-band attribute updates
//!
//! # Architecture
//!
//! - `PatchFileWriter` / `PatchFileIterator`: one patch file of one field
//! - `FieldPatchReader`: newest-wins merge over patch generations of one field
//! - `PatchMerger`: k-way merge across fields, one emission per document
//! - `apply_field_patches` / `apply_pack_patches`: rewrite a segment attribute

mod file;
mod field_reader;
mod merger;
mod apply;

pub use file::*;
pub use field_reader::*;
pub use merger::*;
pub use apply::*;
