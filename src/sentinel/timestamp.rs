//! Timestamp-tagged sentinel family
//!
//! Slot layout is `[timestamp u32 LE][value]`. Bit 31 of the timestamp marks
//! a deleted slot and the low 31 bits keep the real timestamp, so timestamps
//! in seconds run out around 2038. A raw timestamp of `0xFFFF_FFFF` marks an
//! empty slot; real timestamps are clamped to [`MAX_TIMESTAMP`] so that a
//! tombstone can never encode as empty.

use std::cmp::Ordering;

use super::value::SlotValue;
use super::{SentinelSlot, SlotState};
use crate::error::Result;

pub const DELETED_BIT: u32 = 0x8000_0000;
pub const EMPTY_TIMESTAMP: u32 = u32::MAX;
pub const MAX_TIMESTAMP: u32 = 0x7FFF_FFFE;

const TIMESTAMP_LEN: usize = 4;

/// A value paired with the time it was written
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timestamped<T> {
    pub timestamp: u32,
    pub value: T,
}

impl<T> Timestamped<T> {
    pub fn new(timestamp: u32, value: T) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimestampSlot<T> {
    Value(Timestamped<T>),
    Deleted { timestamp: u32 },
    Empty,
}

fn clamp_timestamp(timestamp: u32) -> u32 {
    timestamp.min(MAX_TIMESTAMP)
}

impl<T: SlotValue> TimestampSlot<T> {
    pub fn timestamp(&self) -> Option<u32> {
        match *self {
            TimestampSlot::Value(v) => Some(v.timestamp),
            TimestampSlot::Deleted { timestamp } => Some(timestamp),
            TimestampSlot::Empty => None,
        }
    }

    /// Key slots sort by: the 31-bit timestamp, deleted or not, with empty
    /// slots last
    pub fn sort_key(&self) -> u32 {
        self.timestamp().unwrap_or(EMPTY_TIMESTAMP)
    }

    /// Order two slots by timestamp alone
    pub fn cmp_by_timestamp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    fn raw_timestamp(&self) -> u32 {
        match *self {
            TimestampSlot::Value(v) => v.timestamp,
            TimestampSlot::Deleted { timestamp } => timestamp | DELETED_BIT,
            TimestampSlot::Empty => EMPTY_TIMESTAMP,
        }
    }
}

impl<T: SlotValue> SentinelSlot for TimestampSlot<T> {
    type Value = Timestamped<T>;
    type Tombstone = u32;

    const WIDTH: usize = TIMESTAMP_LEN + T::WIDTH;

    fn empty() -> Self {
        TimestampSlot::Empty
    }

    fn is_empty(&self) -> bool {
        matches!(self, TimestampSlot::Empty)
    }

    fn is_deleted(&self) -> bool {
        matches!(self, TimestampSlot::Deleted { .. })
    }

    fn set_value(&mut self, value: Timestamped<T>) -> Result<()> {
        *self = TimestampSlot::Value(Timestamped::new(
            clamp_timestamp(value.timestamp),
            value.value,
        ));
        Ok(())
    }

    fn set_deleted(&mut self, timestamp: u32) {
        *self = TimestampSlot::Deleted {
            timestamp: clamp_timestamp(timestamp),
        };
    }

    fn value(&self) -> Option<Timestamped<T>> {
        match *self {
            TimestampSlot::Value(v) => Some(v),
            _ => None,
        }
    }

    fn state(&self) -> SlotState<Timestamped<T>> {
        match *self {
            TimestampSlot::Value(v) => SlotState::Value(v),
            TimestampSlot::Deleted { timestamp } => SlotState::Deleted {
                timestamp: Some(timestamp),
            },
            TimestampSlot::Empty => SlotState::Empty,
        }
    }

    fn encode(&self, out: &mut [u8]) {
        self.raw_timestamp().write_slot(&mut out[..TIMESTAMP_LEN]);
        let value_bytes = &mut out[TIMESTAMP_LEN..Self::WIDTH];
        match self {
            TimestampSlot::Value(v) => v.value.write_slot(value_bytes),
            _ => value_bytes.fill(0),
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        let raw = u32::read_slot(&bytes[..TIMESTAMP_LEN]);
        if raw == EMPTY_TIMESTAMP {
            TimestampSlot::Empty
        } else if raw & DELETED_BIT != 0 {
            TimestampSlot::Deleted {
                timestamp: raw & !DELETED_BIT,
            }
        } else {
            TimestampSlot::Value(Timestamped::new(
                raw,
                T::read_slot(&bytes[TIMESTAMP_LEN..Self::WIDTH]),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states() {
        let mut slot = TimestampSlot::<u64>::empty();
        assert!(slot.is_empty() && !slot.is_deleted());

        slot.set_value(Timestamped::new(100, 42)).unwrap();
        assert_eq!(slot.value(), Some(Timestamped::new(100, 42)));
        assert!(!slot.is_empty() && !slot.is_deleted());

        slot.set_deleted(200);
        assert!(slot.is_deleted() && !slot.is_empty());
        assert_eq!(slot.timestamp(), Some(200));
        assert_eq!(
            slot.state(),
            SlotState::Deleted {
                timestamp: Some(200)
            }
        );
    }

    #[test]
    fn test_bit_layout() {
        let mut buf = [0u8; 12];

        TimestampSlot::<u64>::Deleted { timestamp: 5 }.encode(&mut buf);
        assert_eq!(&buf[..4], &[5, 0, 0, 0x80]);
        assert_eq!(&buf[4..], &[0; 8]);

        TimestampSlot::<u64>::Empty.encode(&mut buf);
        assert_eq!(&buf[..4], &[0xFF; 4]);
        assert_eq!(TimestampSlot::<u64>::decode(&buf), TimestampSlot::Empty);

        let live = TimestampSlot::Value(Timestamped::new(7, 9u64));
        live.encode(&mut buf);
        assert_eq!(&buf[..4], &[7, 0, 0, 0]);
        assert_eq!(TimestampSlot::<u64>::decode(&buf), live);
    }

    #[test]
    fn test_timestamp_clamped() {
        let mut slot = TimestampSlot::<u32>::empty();
        slot.set_deleted(u32::MAX);
        assert_eq!(slot.timestamp(), Some(MAX_TIMESTAMP));

        let mut buf = [0u8; 8];
        slot.encode(&mut buf);
        // A tombstone at the largest timestamp still decodes as deleted
        let decoded = TimestampSlot::<u32>::decode(&buf);
        assert!(decoded.is_deleted());
        assert!(!decoded.is_empty());

        slot.set_value(Timestamped::new(0x9000_0000, 1)).unwrap();
        assert_eq!(slot.timestamp(), Some(MAX_TIMESTAMP));
    }

    #[test]
    fn test_ordering_by_timestamp() {
        let mut slots = vec![
            TimestampSlot::<u32>::Empty,
            TimestampSlot::Deleted { timestamp: 30 },
            TimestampSlot::Value(Timestamped::new(50, 1)),
            TimestampSlot::Value(Timestamped::new(10, 2)),
        ];
        slots.sort_by(|a, b| a.cmp_by_timestamp(b));
        let keys: Vec<u32> = slots.iter().map(|s| s.sort_key()).collect();
        assert_eq!(keys, vec![10, 30, 50, EMPTY_TIMESTAMP]);
        assert!(slots[1].is_deleted());
    }
}
