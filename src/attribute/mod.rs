//! Attribute value encoding and per-segment attribute storage
//!
//! # Architecture
//!
//! - `AttributeEncoder`: per-field record format (fixed, var-len, multi-string)
//! - `OffsetTable`: doc ordinal -> byte offset, 32-bit with online 64-bit promotion
//! - `VarLenAttributeWriter` / `VarLenAttributeReader`: data blob + offset table
//! - `PackAttributeFormatter`: several sub-fields packed into one value

mod count;
mod value;
mod encoder;
mod var_len;
mod multi_string;
mod offset_table;
mod writer;
mod reader;
mod pack;

pub use count::*;
pub use value::*;
pub use encoder::*;
pub use var_len::*;
pub use multi_string::*;
pub use offset_table::*;
pub use writer::*;
pub use reader::*;
pub use pack::*;
