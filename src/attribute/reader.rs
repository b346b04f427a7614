//! Segment attribute reader
//!
//! Opens a dumped `(data, offset)` pair for a known document count. Opening
//! checks that the offset table length matches one of the supported widths
//! and that its last entry equals the data length, so a reader that opens
//! successfully never indexes past the data blob.

use std::borrow::Cow;

use super::encoder::{hash_key_of, read_hash_key, verify_hash_key, AttributeEncoder, HASH_KEY_LEN};
use super::offset_table::OffsetTable;
use crate::config::AttributeConfig;
use crate::error::{AttrError, Result};
use crate::store::ByteStore;

/// Read access to one attribute of a sealed segment
#[derive(Debug)]
pub struct VarLenAttributeReader<S> {
    config: AttributeConfig,
    encoder: AttributeEncoder,
    data: S,
    offsets: OffsetTable,
    verify_hash: bool,
}

impl<S: ByteStore> VarLenAttributeReader<S> {
    /// Open an attribute from its data store and offset store
    pub fn open<O: ByteStore>(
        config: &AttributeConfig,
        data: S,
        offset_store: &O,
        doc_count: u32,
    ) -> Result<Self> {
        let offsets = OffsetTable::open(offset_store, doc_count)?;
        Self::from_parts(config, data, offsets, doc_count)
    }

    pub(crate) fn from_parts(
        config: &AttributeConfig,
        data: S,
        offsets: OffsetTable,
        doc_count: u32,
    ) -> Result<Self> {
        if offsets.len() != doc_count as usize + 1 {
            return Err(AttrError::format(
                format!("offset entries of attribute {}", config.name),
                doc_count as u64 + 1,
                offsets.len() as u64,
            ));
        }
        let first = offsets.get(0).unwrap_or(0);
        if first != 0 {
            return Err(AttrError::format(
                format!("first offset of attribute {}", config.name),
                0,
                first,
            ));
        }
        let end = offsets.last().unwrap_or(0);
        if end != data.len() {
            return Err(AttrError::format(
                format!("data length of attribute {}", config.name),
                end,
                data.len(),
            ));
        }

        Ok(Self {
            config: config.clone(),
            encoder: AttributeEncoder::new(config),
            data,
            offsets,
            verify_hash: false,
        })
    }

    /// Check hash keys on every read
    pub fn with_hash_verification(mut self, verify: bool) -> Self {
        self.verify_hash = verify;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    pub fn encoder(&self) -> &AttributeEncoder {
        &self.encoder
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn doc_count(&self) -> u32 {
        self.offsets.doc_count() as u32
    }

    /// Raw encoded record of document `ordinal`
    pub fn record(&self, ordinal: u32) -> Result<Cow<'_, [u8]>> {
        let range = self.offsets.record_range(ordinal as usize).ok_or_else(|| {
            AttrError::InvalidRequest(format!(
                "doc {} out of range for attribute {} with {} docs",
                ordinal,
                self.config.name,
                self.doc_count()
            ))
        })?;

        let bytes = self.data.read_at(range.start, (range.end - range.start) as usize)?;
        if self.verify_hash && self.encoder.hash_enabled() && !verify_hash_key(&bytes) {
            let (stored, computed) = match bytes.get(HASH_KEY_LEN..) {
                Some(payload) => (read_hash_key(&bytes), hash_key_of(payload)),
                None => (0, 0),
            };
            return Err(AttrError::format(
                format!("hash key of doc {} in attribute {}", ordinal, self.config.name),
                computed,
                stored,
            ));
        }
        Ok(bytes)
    }

    /// Iterate raw records in ordinal order
    pub fn records(&self) -> impl Iterator<Item = Result<Cow<'_, [u8]>>> + '_ {
        (0..self.doc_count()).map(move |ordinal| self.record(ordinal))
    }

    /// Decode and validate every record
    pub fn validate_all(&self) -> Result<()> {
        for (ordinal, record) in self.records().enumerate() {
            let record = record?;
            self.encoder.validate(&record).map_err(|e| match e {
                AttrError::Format { context, expected, actual } => AttrError::Format {
                    context: format!("{} (doc {} of attribute {})", context, ordinal, self.config.name),
                    expected,
                    actual,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}
