//! Self-describing integer widths
//!
//! Item counts and string lengths use a 1/2/4 byte big-endian encoding whose
//! width is carried in the top two bits of the first byte:
//!
//! ```text
//! 00xxxxxx                              count < 0x40
//! 01xxxxxx xxxxxxxx                     count < 0x4000
//! 10xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx   count < 0x4000_0000
//! ```
//!
//! Offsets inside a record use a fixed little-endian width chosen per record
//! and stored once as a one-byte tag.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{AttrError, Result};

/// Largest count the variable-width encoding can carry
pub const MAX_COUNT: u32 = 0x3FFF_FFFF;

const TAG_SHIFT: u32 = 6;
const TWO_BYTE_FLAG: u16 = 0x4000;
const FOUR_BYTE_FLAG: u32 = 0x8000_0000;

/// Number of bytes `count` occupies once encoded
pub fn count_len(count: u32) -> usize {
    if count < 0x40 {
        1
    } else if count < 0x4000 {
        2
    } else {
        4
    }
}

/// Append the encoded count and return its length
pub fn encode_count(count: u32, out: &mut Vec<u8>) -> Result<usize> {
    if count > MAX_COUNT {
        return Err(AttrError::InvalidRequest(format!(
            "count {} exceeds maximum encodable count {}",
            count, MAX_COUNT
        )));
    }

    match count_len(count) {
        1 => out.push(count as u8),
        2 => {
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, count as u16 | TWO_BYTE_FLAG);
            out.extend_from_slice(&buf);
        }
        _ => {
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, count | FOUR_BYTE_FLAG);
            out.extend_from_slice(&buf);
        }
    }
    Ok(count_len(count))
}

/// Decode a count from the start of `input`, returning `(count, bytes_used)`
pub fn decode_count(input: &[u8]) -> Result<(u32, usize)> {
    let first = *input
        .first()
        .ok_or_else(|| AttrError::format("count header", 1, 0))?;

    let width = match first >> TAG_SHIFT {
        0 => return Ok(((first & 0x3F) as u32, 1)),
        1 => 2,
        2 => 4,
        tag => {
            // 0b11 is reserved
            return Err(AttrError::format("count width tag (at most 0b10)", 2, tag as u64));
        }
    };

    if input.len() < width {
        return Err(AttrError::format(
            "count header",
            width as u64,
            input.len() as u64,
        ));
    }

    let count = if width == 2 {
        (BigEndian::read_u16(input) & !TWO_BYTE_FLAG) as u32
    } else {
        BigEndian::read_u32(input) & !FOUR_BYTE_FLAG
    };
    Ok((count, width))
}

/// Byte width of an offset entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OffsetWidth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl OffsetWidth {
    /// Parse a stored width tag
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(OffsetWidth::One),
            2 => Ok(OffsetWidth::Two),
            4 => Ok(OffsetWidth::Four),
            8 => Ok(OffsetWidth::Eight),
            other => Err(AttrError::UnsupportedWidth(other)),
        }
    }

    /// Smallest width that can hold `max`
    pub fn for_max(max: u64) -> Self {
        if max <= u8::MAX as u64 {
            OffsetWidth::One
        } else if max <= u16::MAX as u64 {
            OffsetWidth::Two
        } else if max <= u32::MAX as u64 {
            OffsetWidth::Four
        } else {
            OffsetWidth::Eight
        }
    }

    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Read the `index`-th entry of a packed little-endian array
    pub fn read(self, data: &[u8], index: usize) -> u64 {
        let start = index * self.bytes();
        let slot = &data[start..start + self.bytes()];
        match self {
            OffsetWidth::One => slot[0] as u64,
            OffsetWidth::Two => LittleEndian::read_u16(slot) as u64,
            OffsetWidth::Four => LittleEndian::read_u32(slot) as u64,
            OffsetWidth::Eight => LittleEndian::read_u64(slot),
        }
    }

    /// Append one little-endian entry; `value` must fit the width
    pub fn write(self, value: u64, out: &mut Vec<u8>) {
        debug_assert!(OffsetWidth::for_max(value) <= self);
        match self {
            OffsetWidth::One => out.push(value as u8),
            OffsetWidth::Two => out.extend_from_slice(&(value as u16).to_le_bytes()),
            OffsetWidth::Four => out.extend_from_slice(&(value as u32).to_le_bytes()),
            OffsetWidth::Eight => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}
