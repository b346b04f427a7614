//! Multi-string record encoding
//!
//! Record layout:
//!
//! ```text
//! [hash key: u64 LE, if hashing is enabled]
//! [count]
//! [offset width tag: 1 byte]            only when count > 0
//! [count * offset width: item offsets]  relative to the item area
//! [item area: ([length][bytes])*]
//! ```
//!
//! Records are bounded by the per-document byte budget. Items that do not fit
//! are dropped from the tail and the last kept item may be cut short so the
//! record fills the budget exactly.

use tracing::warn;

use super::count::{count_len, decode_count, encode_count, OffsetWidth, MAX_COUNT};
use super::encoder::{finish_hash_key, read_hash_key, reserve_hash_key, EncodeOutcome, HASH_KEY_LEN};
use crate::config::AttributeConfig;
use crate::error::{AttrError, Result};

/// How much of the input fits the budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Plan {
    kept: usize,
    /// Length of the last kept item, possibly shorter than the input
    last_len: usize,
    shortened: bool,
}

/// Encoder for arrays of byte strings
#[derive(Clone, Debug)]
pub struct MultiStringEncoder {
    field: String,
    hash_enabled: bool,
    max_bytes: usize,
    separator: char,
}

impl MultiStringEncoder {
    pub fn new(config: &AttributeConfig) -> Self {
        Self {
            field: config.name.clone(),
            hash_enabled: config.hash_enabled,
            max_bytes: config.max_bytes_per_doc,
            separator: config.separator,
        }
    }

    pub fn hash_enabled(&self) -> bool {
        self.hash_enabled
    }

    fn hash_len(&self) -> usize {
        if self.hash_enabled {
            HASH_KEY_LEN
        } else {
            0
        }
    }

    /// Size of a record whose first `k` items occupy `area_before_last`
    /// bytes before the last item, with the last item `last_len` long
    fn record_size(&self, k: usize, area_before_last: usize, last_len: usize) -> usize {
        if k == 0 {
            return self.hash_len() + count_len(0);
        }
        let width = OffsetWidth::for_max(area_before_last as u64).bytes();
        self.hash_len()
            + count_len(k as u32)
            + 1
            + k * width
            + area_before_last
            + count_len(last_len as u32)
            + last_len
    }

    fn plan(&self, lens: &[usize]) -> Plan {
        let limit = lens.len().min(MAX_COUNT as usize);
        let mut area = 0usize;
        let mut plan = Plan {
            kept: 0,
            last_len: 0,
            shortened: false,
        };

        for (i, &len) in lens[..limit].iter().enumerate() {
            let k = i + 1;
            if len <= MAX_COUNT as usize && self.record_size(k, area, len) <= self.max_bytes {
                plan.kept = k;
                plan.last_len = len;
                area += count_len(len as u32) + len;
                continue;
            }

            // Cut this item to whatever still fits, if anything
            let fixed = self.record_size(k, area, 0) - count_len(0);
            let avail = self.max_bytes.saturating_sub(fixed);
            let best = [(4usize, MAX_COUNT as usize), (2, 0x3FFF), (1, 0x3F)]
                .iter()
                .filter(|(prefix, _)| avail > *prefix)
                .map(|&(prefix, cap)| (avail - prefix).min(cap).min(len))
                .max()
                .unwrap_or(0);
            if best > 0 {
                plan.kept = k;
                plan.last_len = best;
                plan.shortened = true;
            }
            return plan;
        }
        plan
    }

    /// Binary mode: encode byte strings directly
    pub fn encode_items<S: AsRef<[u8]>>(&self, items: &[S], out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        let header = self.record_size(0, 0, 0);
        if self.max_bytes < header {
            return Err(AttrError::InvalidRequest(format!(
                "field {}: max_bytes_per_doc {} cannot hold a {}-byte record header",
                self.field, self.max_bytes, header
            )));
        }

        let lens: Vec<usize> = items.iter().map(|s| s.as_ref().len()).collect();
        let plan = self.plan(&lens);

        let start = out.len();
        if self.hash_enabled {
            reserve_hash_key(out);
        }
        encode_count(plan.kept as u32, out)?;

        if plan.kept > 0 {
            let kept = &items[..plan.kept];
            let item_len = |i: usize| {
                if i + 1 == plan.kept {
                    plan.last_len
                } else {
                    lens[i]
                }
            };

            let mut offsets = Vec::with_capacity(plan.kept);
            let mut area = 0usize;
            for i in 0..plan.kept {
                offsets.push(area as u64);
                area += count_len(item_len(i) as u32) + item_len(i);
            }

            let width = OffsetWidth::for_max(offsets.last().copied().unwrap_or(0));
            out.push(width.tag());
            for &offset in &offsets {
                width.write(offset, out);
            }
            for (i, item) in kept.iter().enumerate() {
                let len = item_len(i);
                encode_count(len as u32, out)?;
                out.extend_from_slice(&item.as_ref()[..len]);
            }
        }

        if self.hash_enabled {
            finish_hash_key(out, start);
        }

        let outcome = EncodeOutcome::new(plan.kept as u32, items.len() - plan.kept, plan.shortened);
        if outcome.truncated {
            warn!(
                field = %self.field,
                kept = plan.kept,
                dropped = outcome.dropped_items,
                shortened_last = plan.shortened,
                max_bytes = self.max_bytes,
                "multi-string record truncated to per-document byte budget"
            );
        }
        Ok(outcome)
    }

    /// Text mode: split on the configured separator
    pub fn encode_text(&self, text: &str, out: &mut Vec<u8>) -> Result<EncodeOutcome> {
        if text.is_empty() {
            return self.encode_items::<&str>(&[], out);
        }
        let items: Vec<&str> = text.split(self.separator).collect();
        self.encode_items(&items, out)
    }

    fn header(&self, bytes: &[u8]) -> Result<(u32, usize)> {
        let hash = self.hash_len();
        if bytes.len() < hash {
            return Err(AttrError::format(
                format!("hash key of {}", self.field),
                hash as u64,
                bytes.len() as u64,
            ));
        }
        let (count, width) = decode_count(&bytes[hash..])?;
        Ok((count, hash + width))
    }

    fn offsets_layout(&self, bytes: &[u8], count: u32, pos: usize) -> Result<(OffsetWidth, usize)> {
        let tag = *bytes.get(pos).ok_or_else(|| {
            AttrError::format(format!("offset width of {}", self.field), 1, 0)
        })?;
        let width = OffsetWidth::from_tag(tag)?;
        let items_start = pos + 1 + count as usize * width.bytes();
        if bytes.len() < items_start {
            return Err(AttrError::format(
                format!("offsets of {}", self.field),
                items_start as u64,
                bytes.len() as u64,
            ));
        }
        Ok((width, items_start))
    }

    /// Byte length of the record at the start of `bytes`
    pub fn record_len(&self, bytes: &[u8]) -> Result<usize> {
        let (count, pos) = self.header(bytes)?;
        if count == 0 {
            return Ok(pos);
        }

        let (width, items_start) = self.offsets_layout(bytes, count, pos)?;
        let last = width.read(&bytes[pos + 1..], count as usize - 1) as usize;
        let last_start = items_start + last;
        if last_start >= bytes.len() {
            return Err(AttrError::format(
                format!("last item of {}", self.field),
                last_start as u64 + 1,
                bytes.len() as u64,
            ));
        }
        let (len, prefix) = decode_count(&bytes[last_start..])?;
        Ok(last_start + prefix + len as usize)
    }

    /// View a record without copying.
    ///
    /// Every offset is checked once here so item access cannot go out of bounds.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<MultiStringRecord<'a>> {
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
        let (count, pos) = self.header(bytes)?;
        if count == 0 {
            return Ok(MultiStringRecord {
                hash_key,
                count,
                width: OffsetWidth::One,
                offsets: &[],
                items: &[],
            });
        }

        let (width, items_start) = self.offsets_layout(bytes, count, pos)?;
        let offsets = &bytes[pos + 1..items_start];
        let items = &bytes[items_start..];

        let mut expected = 0u64;
        for i in 0..count as usize {
            let offset = width.read(offsets, i);
            if offset != expected || offset as usize >= items.len() {
                return Err(AttrError::format(
                    format!("item {} offset of {}", i, self.field),
                    expected,
                    offset,
                ));
            }
            let (item_len, prefix) = decode_count(&items[offset as usize..])?;
            expected = offset + prefix as u64 + item_len as u64;
        }

        Ok(MultiStringRecord {
            hash_key,
            count,
            width,
            offsets,
            items,
        })
    }
}

/// Borrowed view over an encoded multi-string record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiStringRecord<'a> {
    hash_key: Option<u64>,
    count: u32,
    width: OffsetWidth,
    offsets: &'a [u8],
    items: &'a [u8],
}

impl<'a> MultiStringRecord<'a> {
    pub fn hash_key(&self) -> Option<u64> {
        self.hash_key
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn offset_width(&self) -> OffsetWidth {
        self.width
    }

    /// Bytes of the `index`-th item
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.len() {
            return None;
        }
        let offset = self.width.read(self.offsets, index) as usize;
        let (len, prefix) = decode_count(&self.items[offset..]).ok()?;
        let start = offset + prefix;
        self.items.get(start..start + len as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.iter().map(|s| s.to_vec()).collect()
    }
}
