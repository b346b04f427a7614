//! Document ordinal -> byte offset table for variable-length data
//!
//! A segment holding N documents stores N+1 offsets; document `i` occupies
//! `offset[i]..offset[i+1]` of the data blob. Entries are u32 until an offset
//! no longer fits, at which point the whole table is rebuilt as u64.
//!
//! On disk the table is a flat little-endian array of exactly
//! `(doc_count + 1) * width` bytes; the width is inferred from that length.
//!
//! Promotion takes `&mut self`, so no borrowed [`OffsetView`] can observe the
//! swap. Segments are sealed (and promoted, if ever) before being published
//! to readers.

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use tracing::info;

use super::count::OffsetWidth;
use crate::error::{AttrError, Result};
use crate::store::{AppendStore, ByteStore};

/// Backing array of an offset table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OffsetStorage {
    Narrow(Vec<u32>),
    Wide(Vec<u64>),
}

/// Growable offset table with online 32 -> 64 bit promotion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetTable {
    storage: OffsetStorage,
}

impl OffsetTable {
    /// Empty narrow table
    pub fn new() -> Self {
        Self {
            storage: OffsetStorage::Narrow(Vec::new()),
        }
    }

    /// Empty table with room for `entries`, optionally starting wide
    pub fn with_capacity(entries: usize, wide: bool) -> Self {
        let storage = if wide {
            OffsetStorage::Wide(Vec::with_capacity(entries))
        } else {
            OffsetStorage::Narrow(Vec::with_capacity(entries))
        };
        Self { storage }
    }

    pub fn width(&self) -> OffsetWidth {
        match self.storage {
            OffsetStorage::Narrow(_) => OffsetWidth::Four,
            OffsetStorage::Wide(_) => OffsetWidth::Eight,
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self.storage, OffsetStorage::Wide(_))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match &self.storage {
            OffsetStorage::Narrow(v) => v.len(),
            OffsetStorage::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents covered, given the trailing end entry
    pub fn doc_count(&self) -> usize {
        self.len().saturating_sub(1)
    }

    pub fn get(&self, ordinal: usize) -> Option<u64> {
        self.view().get(ordinal)
    }

    pub fn last(&self) -> Option<u64> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Byte range of document `ordinal` in the data blob
    pub fn record_range(&self, ordinal: usize) -> Option<Range<u64>> {
        self.view().record_range(ordinal)
    }

    /// Append an entry, promoting first if it does not fit 32 bits
    pub fn append(&mut self, offset: u64) {
        debug_assert!(self.last().map_or(true, |last| last <= offset));
        if offset > u32::MAX as u64 {
            self.promote_to_wide();
        }
        match &mut self.storage {
            OffsetStorage::Narrow(v) => v.push(offset as u32),
            OffsetStorage::Wide(v) => v.push(offset),
        }
    }

    /// Promote ahead of time if `upcoming` would overflow the narrow width
    pub fn reserve_for(&mut self, upcoming: u64) {
        if upcoming > u32::MAX as u64 {
            self.promote_to_wide();
        }
    }

    /// Rebuild the table with 64-bit entries.
    ///
    /// The wide array is built in full and then swapped in; the narrow array
    /// is dropped. Returns false if the table was already wide.
    pub fn promote_to_wide(&mut self) -> bool {
        let wide = match &self.storage {
            OffsetStorage::Narrow(v) => {
                let mut wide = Vec::with_capacity(v.capacity().max(v.len() + 1));
                wide.extend(v.iter().map(|&o| o as u64));
                wide
            }
            OffsetStorage::Wide(_) => return false,
        };

        info!(entries = wide.len(), "promoting offset table to 64-bit entries");
        self.storage = OffsetStorage::Wide(wide);
        true
    }

    /// Borrowed read-only view
    pub fn view(&self) -> OffsetView<'_> {
        match &self.storage {
            OffsetStorage::Narrow(v) => OffsetView::Narrow(v),
            OffsetStorage::Wide(v) => OffsetView::Wide(v),
        }
    }

    /// Serialize to the on-disk flat array
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.storage {
            OffsetStorage::Narrow(v) => {
                let mut out = vec![0u8; v.len() * 4];
                LittleEndian::write_u32_into(v, &mut out);
                out
            }
            OffsetStorage::Wide(v) => {
                let mut out = vec![0u8; v.len() * 8];
                LittleEndian::write_u64_into(v, &mut out);
                out
            }
        }
    }

    pub fn write_to<S: AppendStore>(&self, store: &mut S) -> Result<()> {
        store.append(&self.to_bytes())?;
        Ok(())
    }

    /// Infer the entry width of a table covering `doc_count` documents
    pub fn infer_width(byte_len: u64, doc_count: u32) -> Result<OffsetWidth> {
        let entries = doc_count as u64 + 1;
        if byte_len == entries * 4 {
            Ok(OffsetWidth::Four)
        } else if byte_len == entries * 8 {
            Ok(OffsetWidth::Eight)
        } else {
            Err(AttrError::format(
                format!(
                    "offset table length for {} docs (4-byte: {}, 8-byte: {})",
                    doc_count,
                    entries * 4,
                    entries * 8
                ),
                entries * 4,
                byte_len,
            ))
        }
    }

    /// Parse a serialized table, validating length and monotonicity
    pub fn from_bytes(bytes: &[u8], doc_count: u32) -> Result<Self> {
        let entries = doc_count as usize + 1;
        let storage = match Self::infer_width(bytes.len() as u64, doc_count)? {
            OffsetWidth::Four => {
                let mut v = vec![0u32; entries];
                LittleEndian::read_u32_into(bytes, &mut v);
                OffsetStorage::Narrow(v)
            }
            OffsetWidth::Eight => {
                let mut v = vec![0u64; entries];
                LittleEndian::read_u64_into(bytes, &mut v);
                OffsetStorage::Wide(v)
            }
            other => return Err(AttrError::UnsupportedWidth(other.tag())),
        };

        let table = Self { storage };
        table.validate_monotonic()?;
        Ok(table)
    }

    /// Load a table for `doc_count` documents from a store
    pub fn open<S: ByteStore>(store: &S, doc_count: u32) -> Result<Self> {
        Self::infer_width(store.len(), doc_count)?;
        let bytes = store.read_all()?;
        Self::from_bytes(&bytes, doc_count)
    }

    fn validate_monotonic(&self) -> Result<()> {
        let view = self.view();
        for i in 1..self.len() {
            let (prev, cur) = (view.get(i - 1).unwrap_or(0), view.get(i).unwrap_or(0));
            if cur < prev {
                return Err(AttrError::format(
                    format!("offset of doc {} (must not precede doc {})", i, i - 1),
                    prev,
                    cur,
                ));
            }
        }
        Ok(())
    }
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view over either width
#[derive(Clone, Copy, Debug)]
pub enum OffsetView<'a> {
    Narrow(&'a [u32]),
    Wide(&'a [u64]),
}

impl<'a> OffsetView<'a> {
    pub fn len(&self) -> usize {
        match self {
            OffsetView::Narrow(v) => v.len(),
            OffsetView::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, ordinal: usize) -> Option<u64> {
        match self {
            OffsetView::Narrow(v) => v.get(ordinal).map(|&o| o as u64),
            OffsetView::Wide(v) => v.get(ordinal).copied(),
        }
    }

    pub fn record_range(&self, ordinal: usize) -> Option<Range<u64>> {
        Some(self.get(ordinal)?..self.get(ordinal + 1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn test_append_and_get() {
        let mut table = OffsetTable::new();
        assert!(table.is_empty());
        for offset in [0u64, 4, 4, 10] {
            table.append(offset);
        }
        assert_eq!(table.len(), 4);
        assert_eq!(table.doc_count(), 3);
        assert_eq!(table.get(2), Some(4));
        assert_eq!(table.get(4), None);
        assert_eq!(table.record_range(1), Some(4..4));
        assert_eq!(table.record_range(2), Some(4..10));
        assert_eq!(table.record_range(3), None);
        assert_eq!(table.width(), OffsetWidth::Four);
    }

    #[test]
    fn test_monotonic_offsets() {
        let mut table = OffsetTable::new();
        let mut offset = 0u64;
        for i in 0..500u64 {
            table.append(offset);
            offset += i % 7;
        }
        for i in 0..table.len() - 1 {
            assert!(table.get(i).unwrap() <= table.get(i + 1).unwrap());
        }
    }

    #[test]
    fn test_promotion_transparency() {
        let mut promoted = OffsetTable::new();
        let mut reference = OffsetTable::with_capacity(65, true);
        for i in 0..64u64 {
            promoted.append(i * 1000);
            reference.append(i * 1000);
        }
        assert!(!promoted.is_wide());

        let big = u32::MAX as u64 + 17;
        promoted.append(big);
        reference.append(big);

        assert!(promoted.is_wide());
        for i in 0..64 {
            assert_eq!(promoted.get(i), Some(i as u64 * 1000));
        }
        assert_eq!(promoted.get(64), Some(big));
        assert_eq!(promoted, reference);
    }

    #[test]
    fn test_proactive_promotion() {
        let mut table = OffsetTable::new();
        table.append(0);
        table.reserve_for(100);
        assert!(!table.is_wide());
        table.reserve_for(1 << 40);
        assert!(table.is_wide());
        assert!(!table.promote_to_wide());
        assert_eq!(table.get(0), Some(0));
    }

    #[test]
    fn test_width_inference() {
        let mut narrow = OffsetTable::new();
        let mut wide = OffsetTable::with_capacity(4, true);
        for offset in [0u64, 3, 9, 12] {
            narrow.append(offset);
            wide.append(offset);
        }

        let narrow_bytes = narrow.to_bytes();
        assert_eq!(narrow_bytes.len(), 16);
        assert_eq!(OffsetTable::from_bytes(&narrow_bytes, 3).unwrap(), narrow);

        let wide_store = MemStore::from(wide.to_bytes());
        let reopened = OffsetTable::open(&wide_store, 3).unwrap();
        assert!(reopened.is_wide());
        assert_eq!(reopened.get(3), Some(12));
    }

    #[test]
    fn test_length_mismatch_is_format_error() {
        let err = OffsetTable::from_bytes(&[0u8; 20], 3).unwrap_err();
        assert!(err.is_fatal_format());
        let msg = err.to_string();
        assert!(msg.contains("expected 16, got 20"), "{}", msg);
    }

    #[test]
    fn test_non_monotonic_is_format_error() {
        let mut bytes = Vec::new();
        for offset in [0u32, 8, 4] {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        assert!(OffsetTable::from_bytes(&bytes, 2).unwrap_err().is_fatal_format());
    }

    #[test]
    fn test_write_to_store() {
        let mut table = OffsetTable::new();
        table.append(0);
        table.append(5);
        let mut store = MemStore::new();
        table.write_to(&mut store).unwrap();
        assert_eq!(store.as_bytes(), &[0, 0, 0, 0, 5, 0, 0, 0]);
    }
}
