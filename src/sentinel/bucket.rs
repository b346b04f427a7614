//! Byte-backed array of fixed-width slots
//!
//! The storage a hash-table engine searches: every slot is `S::WIDTH` bytes and
//! starts out empty. Slots are decoded on read and encoded on write, so the
//! bytes are always in the stored layout and can be dumped as-is.

use std::marker::PhantomData;

use super::SentinelSlot;
use crate::error::{AttrError, Result};

#[derive(Clone, Debug)]
pub struct BucketArray<S> {
    bytes: Vec<u8>,
    len: usize,
    _slot: PhantomData<S>,
}

impl<S: SentinelSlot> BucketArray<S> {
    /// Array of `len` empty slots
    pub fn new(len: usize) -> Self {
        let mut bytes = vec![0u8; len * S::WIDTH];
        let empty = S::empty();
        for chunk in bytes.chunks_exact_mut(S::WIDTH) {
            empty.encode(chunk);
        }
        Self {
            bytes,
            len,
            _slot: PhantomData,
        }
    }

    /// Adopt stored slot bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() % S::WIDTH != 0 {
            let whole = (bytes.len() / S::WIDTH) * S::WIDTH;
            return Err(AttrError::format(
                format!("bucket array of {}-byte slots", S::WIDTH),
                whole as u64,
                bytes.len() as u64,
            ));
        }
        let len = bytes.len() / S::WIDTH;
        Ok(Self {
            bytes,
            len,
            _slot: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn slot_bytes(&self, index: usize) -> Result<std::ops::Range<usize>> {
        if index >= self.len {
            return Err(AttrError::InvalidRequest(format!(
                "slot {} out of range for {} buckets",
                index, self.len
            )));
        }
        let start = index * S::WIDTH;
        Ok(start..start + S::WIDTH)
    }

    pub fn get(&self, index: usize) -> Result<S> {
        let range = self.slot_bytes(index)?;
        Ok(S::decode(&self.bytes[range]))
    }

    pub fn set(&mut self, index: usize, slot: S) -> Result<()> {
        let range = self.slot_bytes(index)?;
        slot.encode(&mut self.bytes[range]);
        Ok(())
    }

    /// Store a live value, refusing values that would read back as sentinels
    pub fn set_value(&mut self, index: usize, value: S::Value) -> Result<()> {
        let mut slot = self.get(index)?;
        slot.set_value(value)?;
        self.set(index, slot)
    }

    pub fn set_deleted(&mut self, index: usize, tombstone: S::Tombstone) -> Result<()> {
        let mut slot = self.get(index)?;
        slot.set_deleted(tombstone);
        self.set(index, slot)
    }

    pub fn clear(&mut self, index: usize) -> Result<()> {
        self.set(index, S::empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = S> + '_ {
        self.bytes.chunks_exact(S::WIDTH).map(S::decode)
    }

    /// Slots holding a live value
    pub fn live_count(&self) -> usize {
        self.iter().filter(|s| s.value().is_some()).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.iter().filter(|s| s.is_deleted()).count()
    }
}
