//! Patch file format
//!
//! A patch file is a flat sequence of `[doc_id: u32 LE][encoded record]`
//! pairs in strictly increasing doc id order, ended by EOF. There is no
//! header or count; each record is framed by its own self-describing length.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use crate::attribute::{AttributeEncoder, EncodeOutcome};
use crate::config::{AttributeConfig, FieldId};
use crate::error::{AttrError, Result};
use crate::store::{AppendStore, ByteStore};

/// Size of the doc id preceding each record
pub const PATCH_DOC_ID_LEN: usize = 4;

/// First read when sizing a record; grows until the header fits
const RECORD_PREFIX_LEN: usize = 64;

/// One update of one field of one document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchValue {
    pub doc_id: u32,
    pub field_id: FieldId,
    pub record: Vec<u8>,
}

/// An ordered source of patch values for a single field.
///
/// A malformed entry surfaces as an error from `peek_doc_id` or
/// `consume_into`; `Ok(None)` always means the stream is exhausted.
pub trait PatchStream {
    fn field_id(&self) -> FieldId;

    /// Doc id of the next value, or None once exhausted
    fn peek_doc_id(&self) -> Result<Option<u32>>;

    /// Copy the next record into `buf` (replacing its contents) and advance
    fn consume_into(&mut self, buf: &mut Vec<u8>) -> Result<Option<u32>>;

    /// Capacity hint: longest record read so far
    fn max_record_len(&self) -> usize;

    fn consume_one(&mut self) -> Result<Option<PatchValue>> {
        let mut record = Vec::new();
        Ok(self.consume_into(&mut record)?.map(|doc_id| PatchValue {
            doc_id,
            field_id: self.field_id(),
            record,
        }))
    }
}

/// Writer producing a patch file for one field
pub struct PatchFileWriter<S> {
    store: S,
    field: String,
    encoder: AttributeEncoder,
    last_doc: Option<u32>,
    entries: usize,
    scratch: Vec<u8>,
}

impl<S: AppendStore> PatchFileWriter<S> {
    pub fn new(config: &AttributeConfig, store: S) -> Self {
        Self {
            store,
            field: config.name.clone(),
            encoder: AttributeEncoder::new(config),
            last_doc: None,
            entries: 0,
            scratch: Vec::new(),
        }
    }

    /// Patch entries written
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn check_order(&self, doc_id: u32) -> Result<()> {
        match self.last_doc {
            Some(last) if doc_id <= last => Err(AttrError::InvalidRequest(format!(
                "patch for field {}: doc {} does not follow doc {}",
                self.field, doc_id, last
            ))),
            _ => Ok(()),
        }
    }

    /// Append an encoded record for `doc_id`
    pub fn append(&mut self, doc_id: u32, record: &[u8]) -> Result<()> {
        self.check_order(doc_id)?;
        self.encoder.validate(record)?;

        self.scratch.clear();
        self.scratch.extend_from_slice(&doc_id.to_le_bytes());
        self.scratch.extend_from_slice(record);
        self.store.append(&self.scratch)?;

        self.last_doc = Some(doc_id);
        self.entries += 1;
        Ok(())
    }

    /// Encode delimited text and append it for `doc_id`
    pub fn append_text(&mut self, doc_id: u32, text: &str) -> Result<EncodeOutcome> {
        self.check_order(doc_id)?;
        let mut record = Vec::new();
        let outcome = self.encoder.encode_text(text, &mut record)?;
        self.append(doc_id, &record)?;
        Ok(outcome)
    }

    /// Flush and hand back the store
    pub fn finish(mut self) -> Result<S> {
        self.store.flush()?;
        debug!(field = %self.field, entries = self.entries, "finished patch file");
        Ok(self.store)
    }
}

/// Lifecycle of a patch stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStreamState {
    /// Created, file not opened yet
    Idle,
    /// Has at least one value left
    Streaming,
    /// No values left
    Exhausted,
}

/// Entry loaded at the cursor
#[derive(Debug)]
struct PatchEntry {
    doc_id: u32,
    record: Vec<u8>,
}

/// Lazy iterator over one patch file of one field.
///
/// Only the entry under the cursor is held in memory. Each entry is checked
/// against the segment's doc count and the previous doc id when it is
/// loaded; opening loads the first one. A bad entry fails the stream for
/// good.
#[derive(Debug)]
pub struct PatchFileIterator<S> {
    field: String,
    field_id: FieldId,
    encoder: AttributeEncoder,
    store: S,
    doc_count: u32,
    /// Byte offset of the next unread entry
    pos: u64,
    current: Option<PatchEntry>,
    last_doc: Option<u32>,
    /// Offset and reason of the entry that failed the stream
    failure: Option<(u64, String)>,
    state: PatchStreamState,
    entries_read: usize,
    max_record_len: usize,
}

impl<S: ByteStore> PatchFileIterator<S> {
    pub fn new(config: &AttributeConfig, store: S) -> Self {
        Self {
            field: config.name.clone(),
            field_id: config.field_id,
            encoder: AttributeEncoder::new(config),
            store,
            doc_count: 0,
            pos: 0,
            current: None,
            last_doc: None,
            failure: None,
            state: PatchStreamState::Idle,
            entries_read: 0,
            max_record_len: 0,
        }
    }

    /// Create and open in one step
    pub fn open_store(config: &AttributeConfig, store: S, doc_count: u32) -> Result<Self> {
        let mut iter = Self::new(config, store);
        iter.open(doc_count)?;
        Ok(iter)
    }

    /// Start streaming against the segment's doc count, loading the first entry
    pub fn open(&mut self, doc_count: u32) -> Result<()> {
        if self.state != PatchStreamState::Idle {
            return Err(AttrError::InvalidRequest(format!(
                "patch stream for field {} already opened",
                self.field
            )));
        }

        self.doc_count = doc_count;
        self.state = PatchStreamState::Streaming;
        self.load_next()?;
        debug!(
            field = %self.field,
            bytes = self.store.len(),
            state = ?self.state,
            "opened patch stream"
        );
        Ok(())
    }

    pub fn state(&self) -> PatchStreamState {
        self.state
    }

    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// Entries loaded so far, including the one under the cursor
    pub fn entries_read(&self) -> usize {
        self.entries_read
    }

    /// Borrow the next record without consuming it
    pub fn peek_record(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.record.as_slice())
    }

    /// Skip the next value
    pub fn skip_one(&mut self) -> Result<Option<u32>> {
        self.check_failed()?;
        match self.current.take() {
            Some(entry) => {
                self.load_next()?;
                Ok(Some(entry.doc_id))
            }
            None => Ok(None),
        }
    }

    fn check_failed(&self) -> Result<()> {
        match &self.failure {
            Some((offset, reason)) => Err(AttrError::corrupt_patch(&self.field, *offset, reason.clone())),
            None => Ok(()),
        }
    }

    /// Load the entry at `pos`, failing the stream if it is malformed
    fn load_next(&mut self) -> Result<()> {
        let offset = self.pos;
        match self.read_entry() {
            Ok(Some(entry)) => {
                self.max_record_len = self.max_record_len.max(entry.record.len());
                self.last_doc = Some(entry.doc_id);
                self.entries_read += 1;
                self.current = Some(entry);
                Ok(())
            }
            Ok(None) => {
                self.current = None;
                self.state = PatchStreamState::Exhausted;
                Ok(())
            }
            Err(err) => {
                warn!(field = %self.field, offset = offset, error = %err, "patch stream failed");
                self.current = None;
                self.state = PatchStreamState::Exhausted;
                self.failure = Some((offset, err.to_string()));
                Err(err)
            }
        }
    }

    fn read_entry(&mut self) -> Result<Option<PatchEntry>> {
        let file_len = self.store.len();
        if self.pos >= file_len {
            return Ok(None);
        }

        let pos = self.pos;
        if file_len - pos < PATCH_DOC_ID_LEN as u64 {
            return Err(AttrError::corrupt_patch(&self.field, pos, "truncated doc id"));
        }
        let doc_id = LittleEndian::read_u32(&self.store.read_at(pos, PATCH_DOC_ID_LEN)?);

        if doc_id >= self.doc_count {
            return Err(AttrError::format(
                format!("doc id bound of patch for field {} at byte {}", self.field, pos),
                self.doc_count as u64,
                doc_id as u64,
            ));
        }
        if let Some(last) = self.last_doc {
            if doc_id <= last {
                return Err(AttrError::format(
                    format!("doc id ordering of patch for field {} at byte {}", self.field, pos),
                    last as u64 + 1,
                    doc_id as u64,
                ));
            }
        }

        let start = pos + PATCH_DOC_ID_LEN as u64;
        let available = (file_len - start) as usize;
        let len = self.record_len_at(start, available)?;
        let record = self.store.read_at(start, len)?.into_owned();
        self.encoder
            .validate(&record)
            .map_err(|e| AttrError::corrupt_patch(&self.field, start, e.to_string()))?;

        self.pos = start + len as u64;
        Ok(Some(PatchEntry { doc_id, record }))
    }

    /// Size the record at `start` by reading a growing prefix of it
    fn record_len_at(&self, start: u64, available: usize) -> Result<usize> {
        let mut window = available.min(RECORD_PREFIX_LEN);
        loop {
            let prefix = self.store.read_at(start, window)?;
            match self.encoder.record_len(&prefix) {
                Ok(len) if len <= available => return Ok(len),
                Ok(len) => {
                    return Err(AttrError::corrupt_patch(
                        &self.field,
                        start,
                        format!("record of {} bytes runs past end of file", len),
                    ))
                }
                Err(e) if window >= available => {
                    return Err(AttrError::corrupt_patch(&self.field, start, e.to_string()))
                }
                Err(_) => window = window.saturating_mul(2).min(available),
            }
        }
    }
}

impl<S: ByteStore> PatchStream for PatchFileIterator<S> {
    fn field_id(&self) -> FieldId {
        self.field_id
    }

    fn peek_doc_id(&self) -> Result<Option<u32>> {
        self.check_failed()?;
        Ok(self.current.as_ref().map(|e| e.doc_id))
    }

    fn consume_into(&mut self, buf: &mut Vec<u8>) -> Result<Option<u32>> {
        self.check_failed()?;
        let entry = match self.current.take() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        buf.clear();
        buf.extend_from_slice(&entry.record);
        self.load_next()?;
        Ok(Some(entry.doc_id))
    }

    fn max_record_len(&self) -> usize {
        self.max_record_len
    }
}
