//! Sentinel slot codecs for open-addressing buckets
//!
//! A slot is a fixed-width value that can also mean "empty" or "deleted".
//! In memory a slot is an enum; the reserved bit patterns only exist in the
//! encoded bytes.
//!
//! # Architecture
//!
//! - `OrdinalSlot`: reserves `MAX` and `MAX - 1` of an integer domain
//! - `TimestampSlot`: steals bit 31 of a 32-bit timestamp as the delete flag
//! - `BucketArray`: byte-backed slot storage addressed by index

mod value;
mod ordinal;
mod timestamp;
mod bucket;

pub use value::*;
pub use ordinal::*;
pub use timestamp::*;
pub use bucket::*;

use crate::error::Result;

/// Decoded state of any slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SlotState<T> {
    Value(T),
    Deleted { timestamp: Option<u32> },
    Empty,
}

/// Common contract of both sentinel families
pub trait SentinelSlot: Copy {
    /// What a live slot holds
    type Value: Copy;
    /// Metadata recorded with a deletion
    type Tombstone: Copy;

    /// Encoded size in bytes
    const WIDTH: usize;

    fn empty() -> Self;

    fn is_empty(&self) -> bool;

    fn is_deleted(&self) -> bool;

    /// Fails with `ReservedSentinel` if `value` would encode as a marker
    fn set_value(&mut self, value: Self::Value) -> Result<()>;

    fn set_deleted(&mut self, tombstone: Self::Tombstone);

    fn set_empty(&mut self) {
        *self = Self::empty();
    }

    fn value(&self) -> Option<Self::Value>;

    fn state(&self) -> SlotState<Self::Value> {
        match self.value() {
            Some(v) => SlotState::Value(v),
            None if self.is_deleted() => SlotState::Deleted { timestamp: None },
            None => SlotState::Empty,
        }
    }

    /// Write exactly `WIDTH` bytes
    fn encode(&self, out: &mut [u8]);

    /// Read from exactly `WIDTH` bytes
    fn decode(bytes: &[u8]) -> Self;
}
