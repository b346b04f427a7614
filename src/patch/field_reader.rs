//! Merging several patch generations of one field
//!
//! Each dump of updates produces a new patch file generation. When two
//! generations touch the same document the newer one wins and the older
//! value is skipped.

use crate::config::{AttributeConfig, FieldId};
use crate::error::{AttrError, Result};
use crate::store::ByteStore;

use super::file::{PatchFileIterator, PatchStream};

/// Patch stream over every generation of one field
#[derive(Debug)]
pub struct FieldPatchReader<S> {
    field_id: FieldId,
    /// (generation, stream), sorted by generation ascending
    streams: Vec<(u64, PatchFileIterator<S>)>,
}

impl<S: ByteStore> FieldPatchReader<S> {
    pub fn new(field_id: FieldId) -> Self {
        Self {
            field_id,
            streams: Vec::new(),
        }
    }

    /// Open one generation and add it to the merge
    pub fn add_generation(
        &mut self,
        config: &AttributeConfig,
        generation: u64,
        store: S,
        doc_count: u32,
    ) -> Result<()> {
        let iter = PatchFileIterator::open_store(config, store, doc_count)?;
        self.add_stream(generation, iter)
    }

    /// Add an already opened stream
    pub fn add_stream(&mut self, generation: u64, stream: PatchFileIterator<S>) -> Result<()> {
        if stream.field_id() != self.field_id {
            return Err(AttrError::InvalidRequest(format!(
                "patch stream of field {} added to reader of field {}",
                stream.field_id(),
                self.field_id
            )));
        }
        if self.streams.iter().any(|(g, _)| *g == generation) {
            return Err(AttrError::InvalidRequest(format!(
                "duplicate patch generation {} for field {}",
                generation, self.field_id
            )));
        }

        let pos = self.streams.partition_point(|(g, _)| *g < generation);
        self.streams.insert(pos, (generation, stream));
        Ok(())
    }

    pub fn generation_count(&self) -> usize {
        self.streams.len()
    }

    /// Index of the newest stream holding the smallest pending doc id
    fn newest_min(&self) -> Result<Option<(usize, u32)>> {
        let mut best: Option<(usize, u32)> = None;
        for (i, (_, stream)) in self.streams.iter().enumerate() {
            if let Some(doc_id) = stream.peek_doc_id()? {
                // Later generations come later in the vec, so `<=` keeps the newest
                if best.map_or(true, |(_, d)| doc_id <= d) {
                    best = Some((i, doc_id));
                }
            }
        }
        Ok(best)
    }
}

impl<S: ByteStore> PatchStream for FieldPatchReader<S> {
    fn field_id(&self) -> FieldId {
        self.field_id
    }

    fn peek_doc_id(&self) -> Result<Option<u32>> {
        Ok(self.newest_min()?.map(|(_, doc_id)| doc_id))
    }

    fn consume_into(&mut self, buf: &mut Vec<u8>) -> Result<Option<u32>> {
        let (winner, doc_id) = match self.newest_min()? {
            Some(found) => found,
            None => return Ok(None),
        };
        for (i, (_, stream)) in self.streams.iter_mut().enumerate() {
            if i != winner && stream.peek_doc_id()? == Some(doc_id) {
                stream.skip_one()?;
            }
        }
        self.streams[winner].1.consume_into(buf)
    }

    fn max_record_len(&self) -> usize {
        self.streams.iter().map(|(_, s)| s.max_record_len()).max().unwrap_or(0)
    }
}
