//! Segment attribute writer
//!
//! Accumulates one encoded record per document into a data blob and tracks
//! record boundaries in an [`OffsetTable`]. The writer is owned by the single
//! thread building the segment; readers only see it after [`dump`] or through
//! [`VarLenAttributeWriter::into_reader`].
//!
//! [`dump`]: VarLenAttributeWriter::dump

use tracing::debug;

use super::encoder::{AttributeEncoder, EncodeOutcome};
use super::offset_table::OffsetTable;
use super::reader::VarLenAttributeReader;
use crate::config::{AttributeConfig, StorageConfig};
use crate::error::Result;
use crate::store::{AppendStore, MemStore};

/// Writer for one attribute of one segment
#[derive(Debug)]
pub struct VarLenAttributeWriter {
    config: AttributeConfig,
    encoder: AttributeEncoder,
    data: Vec<u8>,
    offsets: OffsetTable,
    truncated_docs: u64,
}

impl VarLenAttributeWriter {
    pub fn new(config: AttributeConfig, storage: &StorageConfig) -> Self {
        let encoder = AttributeEncoder::new(&config);
        let mut offsets = OffsetTable::with_capacity(1, storage.wide_offsets);
        offsets.append(0);

        Self {
            config,
            encoder,
            data: Vec::new(),
            offsets,
            truncated_docs: 0,
        }
    }

    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    pub fn encoder(&self) -> &AttributeEncoder {
        &self.encoder
    }

    /// Documents written so far
    pub fn doc_count(&self) -> u32 {
        self.offsets.doc_count() as u32
    }

    pub fn data_len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    /// Documents whose value was cut to fit the byte budget
    pub fn truncated_docs(&self) -> u64 {
        self.truncated_docs
    }

    /// Encode delimited text as the next document's value
    pub fn add_text(&mut self, text: &str) -> Result<EncodeOutcome> {
        let start = self.data.len();
        let outcome = match self.encoder.encode_text(text, &mut self.data) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.data.truncate(start);
                return Err(e);
            }
        };

        if outcome.truncated {
            self.truncated_docs += 1;
            debug!(
                field = %self.config.name,
                doc = self.doc_count(),
                total = self.truncated_docs,
                "counted truncated document"
            );
        }
        self.offsets.append(self.data.len() as u64);
        Ok(outcome)
    }

    /// Append an already encoded record as the next document's value
    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        self.encoder.validate(record)?;
        self.push_record(record);
        Ok(())
    }

    /// Append the field's empty value
    pub fn add_empty(&mut self) -> Result<()> {
        let empty = self.encoder.empty_record()?;
        self.push_record(&empty);
        Ok(())
    }

    pub(crate) fn push_record(&mut self, record: &[u8]) {
        let end = self.data.len() as u64 + record.len() as u64;
        self.offsets.reserve_for(end);
        self.data.extend_from_slice(record);
        self.offsets.append(end);
    }

    /// Raw record of a document already written
    pub fn record(&self, ordinal: u32) -> Option<&[u8]> {
        let range = self.offsets.record_range(ordinal as usize)?;
        self.data.get(range.start as usize..range.end as usize)
    }

    /// Write the data blob and offset table to their stores
    pub fn dump<D: AppendStore, O: AppendStore>(&self, data: &mut D, offsets: &mut O) -> Result<()> {
        data.append(&self.data)?;
        data.flush()?;
        self.offsets.write_to(offsets)?;
        offsets.flush()?;

        debug!(
            field = %self.config.name,
            docs = self.doc_count(),
            bytes = self.data.len(),
            wide = self.offsets.is_wide(),
            "dumped attribute"
        );
        Ok(())
    }

    /// Seal the writer into an in-memory reader
    pub fn into_reader(self) -> Result<VarLenAttributeReader<MemStore>> {
        let doc_count = self.doc_count();
        VarLenAttributeReader::from_parts(&self.config, MemStore::from(self.data), self.offsets, doc_count)
    }
}
