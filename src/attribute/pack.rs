//! Pack attribute format
//!
//! A pack co-encodes several sub-fields into one value per document:
//!
//! ```text
//! [header: per sub-field, in config order]
//!     fixed-length sub-field -> its raw bytes
//!     var-length sub-field   -> u32 LE offset into the var area
//! [var area: var-length sub-field records, in config order]
//! ```
//!
//! The packed blob is stored as a single-string record so pack columns share
//! the regular writer, reader and offset table.

use byteorder::{ByteOrder, LittleEndian};

use super::count::MAX_COUNT;
use super::encoder::AttributeEncoder;
use super::var_len::VarLenEncoder;
use crate::config::{FieldId, PackAttributeConfig};
use crate::error::{AttrError, Result};

const VAR_SLOT_LEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    /// Inline value at `pos` in the header
    Fixed { pos: usize, len: usize },
    /// Offset slot at `pos`; `var_index` orders it among var sub-fields
    Var { pos: usize, var_index: usize },
}

/// Encoder/decoder for one pack attribute
#[derive(Clone, Debug)]
pub struct PackAttributeFormatter {
    config: PackAttributeConfig,
    encoders: Vec<AttributeEncoder>,
    slots: Vec<Slot>,
    /// Header positions of var slots, by var index
    var_slots: Vec<usize>,
    header_len: usize,
    storage: VarLenEncoder,
}

impl PackAttributeFormatter {
    pub fn new(config: &PackAttributeConfig) -> Self {
        let encoders: Vec<AttributeEncoder> =
            config.sub_fields.iter().map(AttributeEncoder::new).collect();

        let mut slots = Vec::with_capacity(encoders.len());
        let mut var_slots = Vec::new();
        let mut pos = 0;
        for encoder in &encoders {
            match encoder.fixed_length() {
                Some(len) => {
                    slots.push(Slot::Fixed { pos, len });
                    pos += len;
                }
                None => {
                    slots.push(Slot::Var {
                        pos,
                        var_index: var_slots.len(),
                    });
                    var_slots.push(pos);
                    pos += VAR_SLOT_LEN;
                }
            }
        }

        Self {
            config: config.clone(),
            encoders,
            slots,
            var_slots,
            header_len: pos,
            storage: VarLenEncoder::new(&config.storage_config()),
        }
    }

    pub fn config(&self) -> &PackAttributeConfig {
        &self.config
    }

    pub fn sub_field_count(&self) -> usize {
        self.encoders.len()
    }

    pub fn encoder(&self, index: usize) -> Option<&AttributeEncoder> {
        self.encoders.get(index)
    }

    pub fn field_index(&self, field_id: FieldId) -> Option<usize> {
        self.config.sub_field_index(field_id)
    }

    /// Bytes taken by the fixed header of every packed blob
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Pack one encoded record per sub-field into a stored value
    pub fn encode<R: AsRef<[u8]>>(&self, records: &[R]) -> Result<Vec<u8>> {
        if records.len() != self.encoders.len() {
            return Err(AttrError::InvalidRequest(format!(
                "pack {} expects {} sub-field values, got {}",
                self.config.name,
                self.encoders.len(),
                records.len()
            )));
        }

        let var_len: usize = self
            .slots
            .iter()
            .zip(records)
            .filter(|(slot, _)| matches!(slot, Slot::Var { .. }))
            .map(|(_, r)| r.as_ref().len())
            .sum();
        let blob_len = self.header_len + var_len;
        if blob_len > MAX_COUNT as usize || var_len > u32::MAX as usize {
            return Err(AttrError::InvalidRequest(format!(
                "pack {} value of {} bytes is too large",
                self.config.name, blob_len
            )));
        }

        let mut blob = vec![0u8; self.header_len];
        blob.reserve(var_len);
        for ((slot, encoder), record) in self.slots.iter().zip(&self.encoders).zip(records) {
            let record = record.as_ref();
            encoder.validate(record)?;
            match *slot {
                Slot::Fixed { pos, len } => blob[pos..pos + len].copy_from_slice(record),
                Slot::Var { pos, .. } => {
                    let offset = (blob.len() - self.header_len) as u32;
                    LittleEndian::write_u32(&mut blob[pos..pos + VAR_SLOT_LEN], offset);
                    blob.extend_from_slice(record);
                }
            }
        }

        let mut out = Vec::with_capacity(blob.len() + 4);
        self.storage.encode_raw(&blob, &mut out)?;
        Ok(out)
    }

    /// Encode one delimited text per sub-field and pack the result
    pub fn encode_text(&self, texts: &[&str]) -> Result<Vec<u8>> {
        let mut records = Vec::with_capacity(texts.len());
        for (encoder, text) in self.encoders.iter().zip(texts) {
            let mut record = Vec::new();
            encoder.encode_text(text, &mut record)?;
            records.push(record);
        }
        if records.len() != self.encoders.len() {
            return Err(AttrError::InvalidRequest(format!(
                "pack {} expects {} sub-field values, got {}",
                self.config.name,
                self.encoders.len(),
                texts.len()
            )));
        }
        self.encode(&records)
    }

    /// Stored value with every sub-field empty
    pub fn empty_value(&self) -> Result<Vec<u8>> {
        let records = self
            .encoders
            .iter()
            .map(|e| e.empty_record())
            .collect::<Result<Vec<_>>>()?;
        self.encode(&records)
    }

    fn blob<'a>(&self, value: &'a [u8]) -> Result<&'a [u8]> {
        let blob = self.storage.decode(value)?.data();
        if blob.len() < self.header_len {
            return Err(AttrError::format(
                format!("header of pack {}", self.config.name),
                self.header_len as u64,
                blob.len() as u64,
            ));
        }
        Ok(blob)
    }

    fn var_bound(&self, blob: &[u8], var_index: usize) -> u64 {
        match self.var_slots.get(var_index) {
            Some(&pos) => LittleEndian::read_u32(&blob[pos..pos + VAR_SLOT_LEN]) as u64,
            None => (blob.len() - self.header_len) as u64,
        }
    }

    fn extract<'a>(&self, blob: &'a [u8], index: usize) -> Result<&'a [u8]> {
        let record = match self.slots[index] {
            Slot::Fixed { pos, len } => &blob[pos..pos + len],
            Slot::Var { var_index, .. } => {
                let start = self.var_bound(blob, var_index);
                let end = self.var_bound(blob, var_index + 1);
                let area = (blob.len() - self.header_len) as u64;
                if start > end || end > area {
                    return Err(AttrError::format(
                        format!(
                            "var offset of sub-field {} in pack {}",
                            self.config.sub_fields[index].name, self.config.name
                        ),
                        area,
                        end.max(start),
                    ));
                }
                &blob[self.header_len + start as usize..self.header_len + end as usize]
            }
        };
        self.encoders[index].validate(record)?;
        Ok(record)
    }

    /// Encoded record of sub-field `index` inside a stored pack value
    pub fn sub_field<'a>(&self, value: &'a [u8], index: usize) -> Result<&'a [u8]> {
        if index >= self.slots.len() {
            return Err(AttrError::InvalidRequest(format!(
                "pack {} has no sub-field {}",
                self.config.name, index
            )));
        }
        self.extract(self.blob(value)?, index)
    }

    /// Every sub-field record of a stored pack value
    pub fn split<'a>(&self, value: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        let blob = self.blob(value)?;
        (0..self.slots.len()).map(|i| self.extract(blob, i)).collect()
    }

    /// Rebuild a stored value, replacing the sub-fields given in
    /// `replacements` and keeping the rest from `base`
    pub fn rebuild(&self, base: &[u8], replacements: &[Option<&[u8]>]) -> Result<Vec<u8>> {
        let mut records = self.split(base)?;
        for (record, replacement) in records.iter_mut().zip(replacements) {
            if let Some(new) = *replacement {
                *record = new;
            }
        }
        self.encode(&records)
    }
}
