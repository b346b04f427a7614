//! Per-field encoder dispatch
//!
//! `AttributeEncoder` picks the record format from the field config:
//! - single numeric: raw little-endian bytes, fixed length, no header
//! - multi-value numeric and single string: [`VarLenEncoder`]
//! - multi-value string: [`MultiStringEncoder`]

use byteorder::{ByteOrder, LittleEndian};
use xxhash_rust::xxh64::xxh64;

use super::multi_string::MultiStringEncoder;
use super::value::{parse_token, AttrValue};
use super::var_len::VarLenEncoder;
use crate::config::{AttributeConfig, ValueType};
use crate::error::{AttrError, Result};

pub use crate::config::HASH_KEY_LEN;

const HASH_SEED: u64 = 0;

/// Result of a successful encode.
///
/// Truncation is a policy outcome rather than an error; callers decide
/// whether to log or alarm on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeOutcome {
    /// Some input was dropped or shortened
    pub truncated: bool,
    /// Items present in the record
    pub kept_items: u32,
    /// Items dropped from the tail
    pub dropped_items: usize,
    /// The last kept item was cut short
    pub shortened_last: bool,
}

impl EncodeOutcome {
    pub fn new(kept_items: u32, dropped_items: usize, shortened_last: bool) -> Self {
        Self {
            truncated: dropped_items > 0 || shortened_last,
            kept_items,
            dropped_items,
            shortened_last,
        }
    }
}

pub(crate) fn reserve_hash_key(out: &mut Vec<u8>) {
    out.extend_from_slice(&[0u8; HASH_KEY_LEN]);
}

/// Hash key of a record payload (everything after the hash slot)
pub fn hash_key_of(payload: &[u8]) -> u64 {
    xxh64(payload, HASH_SEED)
}

/// Fill the hash slot at `start` with the hash of everything after it
pub(crate) fn finish_hash_key(out: &mut [u8], start: usize) {
    let payload_start = start + HASH_KEY_LEN;
    let hash = hash_key_of(&out[payload_start..]);
    LittleEndian::write_u64(&mut out[start..payload_start], hash);
}

pub(crate) fn read_hash_key(bytes: &[u8]) -> u64 {
    LittleEndian::read_u64(&bytes[..HASH_KEY_LEN])
}

/// Check a hashed record's key against its payload
pub fn verify_hash_key(record: &[u8]) -> bool {
    record.len() >= HASH_KEY_LEN
        && read_hash_key(record) == hash_key_of(&record[HASH_KEY_LEN..])
}

/// Encoder for single fixed-size values
#[derive(Clone, Debug)]
pub struct FixedEncoder {
    field: String,
    value_type: ValueType,
    size: usize,
}

impl FixedEncoder {
    pub fn new(config: &AttributeConfig) -> Self {
        Self {
            field: config.name.clone(),
            value_type: config.value_type,
            size: config.value_type.item_size().unwrap_or(0),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn encode_value<T: AttrValue>(&self, value: T, out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if T::VALUE_TYPE != self.value_type {
            return Err(AttrError::InvalidRequest(format!(
                "field {}: value type {:?} does not match {:?}",
                self.field,
                T::VALUE_TYPE,
                self.value_type
            )));
        }
        value.write_le(out);
        Ok(EncodeOutcome::new(1, 0, false))
    }

    /// Empty text stores the zero value
    pub fn encode_text(&self, text: &str, out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if text.trim().is_empty() {
            out.resize(out.len() + self.size, 0);
            return Ok(EncodeOutcome::new(1, 0, false));
        }
        if !parse_token(self.value_type, text, out) {
            return Err(AttrError::InvalidValue {
                field: self.field.clone(),
                token: text.to_string(),
            });
        }
        Ok(EncodeOutcome::new(1, 0, false))
    }
}

/// Record encoder selected from a field config
#[derive(Clone, Debug)]
pub enum AttributeEncoder {
    Fixed(FixedEncoder),
    VarLen(VarLenEncoder),
    MultiString(MultiStringEncoder),
}

impl AttributeEncoder {
    pub fn new(config: &AttributeConfig) -> Self {
        if config.is_fixed_length() {
            AttributeEncoder::Fixed(FixedEncoder::new(config))
        } else if config.multi_value && config.value_type.is_string() {
            AttributeEncoder::MultiString(MultiStringEncoder::new(config))
        } else {
            AttributeEncoder::VarLen(VarLenEncoder::new(config))
        }
    }

    /// Byte length of every record, for fixed-length fields
    pub fn fixed_length(&self) -> Option<usize> {
        match self {
            AttributeEncoder::Fixed(enc) => Some(enc.size()),
            _ => None,
        }
    }

    /// Whether records carry a hash key prefix
    pub fn hash_enabled(&self) -> bool {
        match self {
            AttributeEncoder::Fixed(_) => false,
            AttributeEncoder::VarLen(enc) => enc.hash_enabled(),
            AttributeEncoder::MultiString(enc) => enc.hash_enabled(),
        }
    }

    /// Encode delimited text input
    pub fn encode_text(&self, text: &str, out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        match self {
            AttributeEncoder::Fixed(enc) => enc.encode_text(text, out),
            AttributeEncoder::VarLen(enc) => enc.encode_text(text, out),
            AttributeEncoder::MultiString(enc) => enc.encode_text(text, out),
        }
    }

    /// Byte length of the record at the start of `bytes`
    pub fn record_len(&self, bytes: &[u8]) -> Result<usize> {
        match self {
            AttributeEncoder::Fixed(enc) => {
                if bytes.len() < enc.size() {
                    return Err(AttrError::format(
                        "fixed-length value",
                        enc.size() as u64,
                        bytes.len() as u64,
                    ));
                }
                Ok(enc.size())
            }
            AttributeEncoder::VarLen(enc) => enc.record_len(bytes),
            AttributeEncoder::MultiString(enc) => enc.record_len(bytes),
        }
    }

    /// Check `bytes` is exactly one well-formed record
    pub fn validate(&self, bytes: &[u8]) -> Result<()> {
        match self {
            AttributeEncoder::Fixed(enc) => {
                if bytes.len() != enc.size() {
                    return Err(AttrError::format(
                        "fixed-length value",
                        enc.size() as u64,
                        bytes.len() as u64,
                    ));
                }
                Ok(())
            }
            AttributeEncoder::VarLen(enc) => enc.decode(bytes).map(|_| ()),
            AttributeEncoder::MultiString(enc) => enc.decode(bytes).map(|_| ()),
        }
    }

    /// Record used when a document has no value: zero for fixed fields,
    /// a zero-item record otherwise
    pub fn empty_record(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            AttributeEncoder::Fixed(enc) => out.resize(enc.size(), 0),
            AttributeEncoder::VarLen(enc) => {
                enc.encode_raw(&[], &mut out)?;
            }
            AttributeEncoder::MultiString(enc) => {
                enc.encode_items::<&[u8]>(&[], &mut out)?;
            }
        }
        Ok(out)
    }
}
