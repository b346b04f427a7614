//! Variable-length record encoding for multi-value numerics and single strings
//!
//! Record layout:
//!
//! ```text
//! [hash key: u64 LE, if hashing is enabled][count][count * item_size bytes]
//! ```
//!
//! A single string is a record of one-byte items, so the count is its length.

use tracing::warn;

use super::count::{count_len, decode_count, encode_count, MAX_COUNT};
use super::encoder::{finish_hash_key, read_hash_key, reserve_hash_key, EncodeOutcome, HASH_KEY_LEN};
use super::value::{parse_token, AttrValue};
use crate::config::{AttributeConfig, ValueType};
use crate::error::{AttrError, Result};

/// Encoder for records of fixed-size items
#[derive(Clone, Debug)]
pub struct VarLenEncoder {
    field: String,
    value_type: ValueType,
    item_size: usize,
    hash_enabled: bool,
    max_bytes: usize,
    separator: char,
    split_items: bool,
}

impl VarLenEncoder {
    pub fn new(config: &AttributeConfig) -> Self {
        Self {
            field: config.name.clone(),
            value_type: config.value_type,
            item_size: config.value_type.item_size().unwrap_or(1),
            hash_enabled: config.hash_enabled,
            max_bytes: config.max_bytes_per_doc,
            separator: config.separator,
            // A single string is one item of raw bytes, never split
            split_items: !config.value_type.is_string(),
        }
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn hash_enabled(&self) -> bool {
        self.hash_enabled
    }

    fn header_len(&self, count: u32) -> usize {
        let hash = if self.hash_enabled { HASH_KEY_LEN } else { 0 };
        hash + count_len(count)
    }

    /// Encoded size of a record holding `count` items
    pub fn encoded_len(&self, count: u32) -> usize {
        self.header_len(count) + count as usize * self.item_size
    }

    /// Largest item count that fits the per-document budget
    fn fitting_count(&self, count: usize) -> u32 {
        let capped = count.min(MAX_COUNT as usize) as u32;
        if self.encoded_len(capped) <= self.max_bytes {
            return capped;
        }
        let room = self.max_bytes.saturating_sub(self.header_len(0));
        let mut fit = capped.min((room / self.item_size) as u32);
        while fit > 0 && self.encoded_len(fit) > self.max_bytes {
            fit -= 1;
        }
        fit
    }

    /// Encode concatenated little-endian items.
    ///
    /// Items past the byte budget are dropped from the tail; fixed-size items
    /// are never partially kept.
    pub fn encode_raw(&self, data: &[u8], out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if data.len() % self.item_size != 0 {
            return Err(AttrError::InvalidRequest(format!(
                "field {}: {} bytes is not a whole number of {}-byte items",
                self.field,
                data.len(),
                self.item_size
            )));
        }

        if self.max_bytes < self.header_len(0) {
            return Err(AttrError::InvalidRequest(format!(
                "field {}: max_bytes_per_doc {} cannot hold a {}-byte record header",
                self.field,
                self.max_bytes,
                self.header_len(0)
            )));
        }

        let total = data.len() / self.item_size;
        let kept = self.fitting_count(total);

        let start = out.len();
        if self.hash_enabled {
            reserve_hash_key(out);
        }
        encode_count(kept, out)?;
        out.extend_from_slice(&data[..kept as usize * self.item_size]);
        if self.hash_enabled {
            finish_hash_key(out, start);
        }

        let outcome = EncodeOutcome::new(kept, total - kept as usize, false);
        if outcome.truncated {
            warn!(
                field = %self.field,
                kept = kept,
                dropped = outcome.dropped_items,
                max_bytes = self.max_bytes,
                "multi-value record truncated to per-document byte budget"
            );
        }
        Ok(outcome)
    }

    /// Binary mode: encode typed items directly
    pub fn encode_items<T: AttrValue>(&self, items: &[T], out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if T::SIZE != self.item_size {
            return Err(AttrError::InvalidRequest(format!(
                "field {}: item type {:?} does not match {:?}",
                self.field,
                T::VALUE_TYPE,
                self.value_type
            )));
        }
        let mut data = Vec::with_capacity(items.len() * T::SIZE);
        for item in items {
            item.write_le(&mut data);
        }
        self.encode_raw(&data, out)
    }

    /// Text mode: parse separator-delimited tokens
    pub fn encode_text(&self, text: &str, out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if !self.split_items {
            return self.encode_raw(text.as_bytes(), out);
        }

        let mut data = Vec::new();
        for token in text.split(self.separator).filter(|t| !t.trim().is_empty()) {
            if !parse_token(self.value_type, token, &mut data) {
                return Err(AttrError::InvalidValue {
                    field: self.field.clone(),
                    token: token.to_string(),
                });
            }
        }
        self.encode_raw(&data, out)
    }

    /// Byte length of the record at the start of `bytes`
    pub fn record_len(&self, bytes: &[u8]) -> Result<usize> {
        let hash = if self.hash_enabled { HASH_KEY_LEN } else { 0 };
        if bytes.len() < hash {
            return Err(AttrError::format(
                format!("hash key of {}", self.field),
                hash as u64,
                bytes.len() as u64,
            ));
        }
        let (count, width) = decode_count(&bytes[hash..])?;
        Ok(hash + width + count as usize * self.item_size)
    }

    /// View a record without copying
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<VarLenRecord<'a>> {
        let len = self.record_len(bytes)?;
        if bytes.len() != len {
            return Err(AttrError::format(
                format!("record of {}", self.field),
                len as u64,
                bytes.len() as u64,
            ));
        }

        let hash_key = if self.hash_enabled {
            Some(read_hash_key(bytes))
        } else {
            None
        };
        let hash = if self.hash_enabled { HASH_KEY_LEN } else { 0 };
        let (count, width) = decode_count(&bytes[hash..])?;

        Ok(VarLenRecord {
            hash_key,
            count,
            item_size: self.item_size,
            data: &bytes[hash + width..],
        })
    }
}

/// Borrowed view over an encoded var-len record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VarLenRecord<'a> {
    hash_key: Option<u64>,
    count: u32,
    item_size: usize,
    data: &'a [u8],
}

impl<'a> VarLenRecord<'a> {
    pub fn hash_key(&self) -> Option<u64> {
        self.hash_key
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Raw item bytes
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Iterate items as `T`; `T::SIZE` must match the field's item size
    pub fn iter<T: AttrValue + 'a>(&self) -> impl Iterator<Item = T> + 'a {
        debug_assert_eq!(T::SIZE, self.item_size);
        self.data.chunks_exact(T::SIZE).map(T::read_le)
    }

    pub fn get<T: AttrValue>(&self, index: usize) -> Option<T> {
        if index >= self.len() || T::SIZE != self.item_size {
            return None;
        }
        Some(T::read_le(&self.data[index * T::SIZE..]))
    }

    pub fn to_vec<T: AttrValue>(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Interpret a single-string record as UTF-8
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.data).ok()
    }
}
