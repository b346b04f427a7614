//! K-way merge of per-field patch streams
//!
//! Streams are held in an owned vector; a min-heap of `(doc_id, index)`
//! orders them by their next doc id. Each call to
//! [`PatchMerger::next_patch`] drains every stream positioned on the
//! smallest doc id into the [`PackPatchAccumulator`], so one document is
//! emitted exactly once with all of its touched sub-fields.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use roaring::RoaringBitmap;
use tracing::debug;

use super::file::PatchStream;
use crate::attribute::PackAttributeFormatter;
use crate::error::{AttrError, Result};

/// One scratch buffer per sub-field, reused across merge steps
#[derive(Debug)]
pub struct PackPatchAccumulator {
    buffers: Vec<Vec<u8>>,
    touched: Vec<bool>,
}

impl PackPatchAccumulator {
    /// `capacity` is the largest record any input stream can yield
    pub fn new(slots: usize, capacity: usize) -> Self {
        Self {
            buffers: (0..slots).map(|_| Vec::with_capacity(capacity)).collect(),
            touched: vec![false; slots],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.buffers.len()
    }

    /// Record of `slot` if the current document touched it
    pub fn get(&self, slot: usize) -> Option<&[u8]> {
        if *self.touched.get(slot)? {
            Some(&self.buffers[slot])
        } else {
            None
        }
    }

    /// Buffer capacity of `slot`
    pub fn capacity(&self, slot: usize) -> usize {
        self.buffers.get(slot).map_or(0, |b| b.capacity())
    }

    fn reset(&mut self) {
        self.touched.iter_mut().for_each(|t| *t = false);
    }
}

/// All updates of one document, borrowed from the merger's accumulator
#[derive(Debug, Clone, Copy)]
pub struct MergedPatch<'a> {
    pub doc_id: u32,
    values: &'a PackPatchAccumulator,
}

impl<'a> MergedPatch<'a> {
    /// Updated record of `slot`, if touched
    pub fn get(&self, slot: usize) -> Option<&'a [u8]> {
        self.values.get(slot)
    }

    /// Updated records per slot, None for untouched slots
    pub fn slots(&self) -> Vec<Option<&'a [u8]>> {
        (0..self.values.slot_count()).map(|i| self.values.get(i)).collect()
    }

    /// Indices of touched slots
    pub fn touched(&self) -> impl Iterator<Item = usize> + 'a {
        let values = self.values;
        (0..values.slot_count()).filter(move |&i| values.touched[i])
    }
}

/// Merges several single-field patch streams by doc id
pub struct PatchMerger<S> {
    streams: Vec<S>,
    /// Accumulator slot of each stream
    slot_of: Vec<usize>,
    heap: BinaryHeap<Reverse<(u32, usize)>>,
    accumulator: PackPatchAccumulator,
    patched: RoaringBitmap,
    emitted: u64,
    last_doc: Option<u32>,
    finished: bool,
    /// Error that stopped the merge
    failed: Option<String>,
}

impl<S: PatchStream> PatchMerger<S> {
    /// Build a merger over `(slot, stream)` pairs
    pub fn new(slot_count: usize, streams: Vec<(usize, S)>) -> Result<Self> {
        let mut seen = vec![false; slot_count];
        for (slot, stream) in &streams {
            match seen.get_mut(*slot) {
                Some(taken) if !*taken => *taken = true,
                Some(_) => {
                    return Err(AttrError::InvalidRequest(format!(
                        "two patch streams target slot {}",
                        slot
                    )))
                }
                None => {
                    return Err(AttrError::InvalidRequest(format!(
                        "patch stream of field {} targets slot {} of {}",
                        stream.field_id(),
                        slot,
                        slot_count
                    )))
                }
            }
        }

        let capacity = streams.iter().map(|(_, s)| s.max_record_len()).max().unwrap_or(0);
        let mut heap = BinaryHeap::with_capacity(streams.len());
        for (index, (_, stream)) in streams.iter().enumerate() {
            if let Some(doc_id) = stream.peek_doc_id()? {
                heap.push(Reverse((doc_id, index)));
            }
        }
        let (slot_of, streams): (Vec<usize>, Vec<S>) = streams.into_iter().unzip();

        Ok(Self {
            streams,
            slot_of,
            heap,
            accumulator: PackPatchAccumulator::new(slot_count, capacity),
            patched: RoaringBitmap::new(),
            emitted: 0,
            last_doc: None,
            finished: false,
            failed: None,
        })
    }

    /// Merger for a single field
    pub fn for_field(stream: S) -> Result<Self> {
        Self::new(1, vec![(0, stream)])
    }

    /// Merger for a pack; each stream is placed by its field id
    pub fn for_pack(formatter: &PackAttributeFormatter, streams: Vec<S>) -> Result<Self> {
        let mut placed = Vec::with_capacity(streams.len());
        for stream in streams {
            let slot = formatter.field_index(stream.field_id()).ok_or_else(|| {
                AttrError::InvalidRequest(format!(
                    "field {} is not part of pack {}",
                    stream.field_id(),
                    formatter.config().name
                ))
            })?;
            placed.push((slot, stream));
        }
        Self::new(formatter.sub_field_count(), placed)
    }

    pub fn accumulator(&self) -> &PackPatchAccumulator {
        &self.accumulator
    }

    fn consume(&mut self, index: usize) -> Result<()> {
        let slot = self.slot_of[index];
        let stream = &mut self.streams[index];
        if stream.consume_into(&mut self.accumulator.buffers[slot])?.is_some() {
            self.accumulator.touched[slot] = true;
        }
        if let Some(next) = stream.peek_doc_id()? {
            self.heap.push(Reverse((next, index)));
        }
        Ok(())
    }

    /// Merge the next document, or None once every stream is exhausted.
    ///
    /// A stream error ends the merge; later calls report it again instead of
    /// treating the remaining streams as complete.
    pub fn next_patch(&mut self) -> Result<Option<MergedPatch<'_>>> {
        if let Some(reason) = &self.failed {
            return Err(AttrError::Internal(format!(
                "patch merge stopped after an earlier error: {}",
                reason
            )));
        }

        let Reverse((doc_id, index)) = match self.heap.pop() {
            Some(top) => top,
            None => {
                if !self.finished {
                    self.finished = true;
                    debug!(emitted = self.emitted, streams = self.streams.len(), "patch merge finished");
                }
                return Ok(None);
            }
        };

        if let Err(err) = self.drain_doc(doc_id, index) {
            self.failed = Some(err.to_string());
            return Err(err);
        }

        if let Some(last) = self.last_doc {
            if doc_id <= last {
                let err = AttrError::format("doc id ordering of merged patches", last as u64 + 1, doc_id as u64);
                self.failed = Some(err.to_string());
                return Err(err);
            }
        }
        self.last_doc = Some(doc_id);
        self.patched.insert(doc_id);
        self.emitted += 1;

        Ok(Some(MergedPatch {
            doc_id,
            values: &self.accumulator,
        }))
    }

    /// Consume every stream positioned on `doc_id`
    fn drain_doc(&mut self, doc_id: u32, first: usize) -> Result<()> {
        self.accumulator.reset();
        self.consume(first)?;
        while let Some(&Reverse((next, index))) = self.heap.peek() {
            if next != doc_id {
                break;
            }
            self.heap.pop();
            self.consume(index)?;
        }
        Ok(())
    }

    /// Documents emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn patched_docs(&self) -> &RoaringBitmap {
        &self.patched
    }

    pub fn into_patched_docs(self) -> RoaringBitmap {
        self.patched
    }
}
