//! Ordinal sentinel family
//!
//! The slot is exactly one `T`. `T::MAX` means empty and `T::MAX - 1` means
//! deleted, so slots order as: values < deleted < empty, which matches the
//! raw integer order.

use super::value::OrdinalValue;
use super::SentinelSlot;
use crate::error::{AttrError, Result};

/// Slot holding a value, a tombstone, or nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrdinalSlot<T> {
    // Variant order is the sort order
    Value(T),
    Deleted,
    Empty,
}

impl<T: OrdinalValue> OrdinalSlot<T> {
    /// Raw slot encoding
    pub fn to_raw(&self) -> T {
        match *self {
            OrdinalSlot::Value(v) => v,
            OrdinalSlot::Deleted => T::DELETED,
            OrdinalSlot::Empty => T::EMPTY,
        }
    }

    pub fn from_raw(raw: T) -> Self {
        if raw == T::EMPTY {
            OrdinalSlot::Empty
        } else if raw == T::DELETED {
            OrdinalSlot::Deleted
        } else {
            OrdinalSlot::Value(raw)
        }
    }
}

impl<T: OrdinalValue> Default for OrdinalSlot<T> {
    fn default() -> Self {
        OrdinalSlot::Empty
    }
}

impl<T: OrdinalValue> SentinelSlot for OrdinalSlot<T> {
    type Value = T;
    type Tombstone = ();

    const WIDTH: usize = T::WIDTH;

    fn empty() -> Self {
        OrdinalSlot::Empty
    }

    fn is_empty(&self) -> bool {
        matches!(self, OrdinalSlot::Empty)
    }

    fn is_deleted(&self) -> bool {
        matches!(self, OrdinalSlot::Deleted)
    }

    fn set_value(&mut self, value: T) -> Result<()> {
        if value == T::EMPTY || value == T::DELETED {
            return Err(AttrError::ReservedSentinel);
        }
        *self = OrdinalSlot::Value(value);
        Ok(())
    }

    fn set_deleted(&mut self, _: ()) {
        *self = OrdinalSlot::Deleted;
    }

    fn value(&self) -> Option<T> {
        match *self {
            OrdinalSlot::Value(v) => Some(v),
            _ => None,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        self.to_raw().write_slot(out);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self::from_raw(T::read_slot(bytes))
    }
}
