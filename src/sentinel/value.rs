//! Fixed-width values that can live in a bucket slot

use std::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};

/// A fixed-width value with a little-endian slot encoding
pub trait SlotValue: Copy + PartialEq + Debug {
    const WIDTH: usize;

    fn write_slot(&self, out: &mut [u8]);

    fn read_slot(bytes: &[u8]) -> Self;
}

/// An integer whose two largest values are given up as sentinels.
///
/// Only valid for fields whose real values never reach `DELETED`.
pub trait OrdinalValue: SlotValue + Ord {
    /// `MAX`, marks an empty slot
    const EMPTY: Self;
    /// `MAX - 1`, marks a deleted slot
    const DELETED: Self;
}

macro_rules! impl_slot_value {
    ($($t:ty => $read:ident, $write:ident);* $(;)?) => {
        $(
            impl SlotValue for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn write_slot(&self, out: &mut [u8]) {
                    LittleEndian::$write(out, *self);
                }

                fn read_slot(bytes: &[u8]) -> Self {
                    LittleEndian::$read(bytes)
                }
            }
        )*
    };
}

macro_rules! impl_ordinal_value {
    ($($t:ty),*) => {
        $(
            impl OrdinalValue for $t {
                const EMPTY: Self = <$t>::MAX;
                const DELETED: Self = <$t>::MAX - 1;
            }
        )*
    };
}

impl_slot_value!(
    u16 => read_u16, write_u16;
    u32 => read_u32, write_u32;
    u64 => read_u64, write_u64;
    i32 => read_i32, write_i32;
    i64 => read_i64, write_i64;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
);

impl_ordinal_value!(u16, u32, u64, i32, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_constants() {
        assert_eq!(u32::EMPTY, u32::MAX);
        assert_eq!(u32::DELETED, u32::MAX - 1);
        assert_eq!(i64::DELETED, i64::MAX - 1);
        assert!(u16::DELETED < u16::EMPTY);
    }

    #[test]
    fn test_slot_encoding() {
        let mut buf = [0u8; 8];
        0x0102_0304u32.write_slot(&mut buf);
        assert_eq!(&buf[..4], &[4, 3, 2, 1]);
        assert_eq!(u32::read_slot(&buf), 0x0102_0304);

        (-2i64).write_slot(&mut buf);
        assert_eq!(i64::read_slot(&buf), -2);
    }
}
