use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{AttrError, Result};

/// Read side of a byte-addressable file
pub trait ByteStore {
    /// Total length in bytes
    fn len(&self) -> u64;

    /// Read `len` bytes starting at `offset`.
    ///
    /// In-memory stores hand out borrowed slices; file stores copy.
    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole store
    fn read_all(&self) -> Result<Cow<'_, [u8]>> {
        self.read_at(0, self.len() as usize)
    }
}

impl<T: ByteStore + ?Sized> ByteStore for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        (**self).read_at(offset, len)
    }
}

/// Append-only write side
pub trait AppendStore: ByteStore {
    /// Append bytes and return the offset they were written at
    fn append(&mut self, data: &[u8]) -> Result<u64>;

    /// Push buffered writes to the backing medium
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn check_range(name: &str, store_len: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64).unwrap_or(u64::MAX);
    if end > store_len {
        return Err(AttrError::format(
            format!("read range of {}", name),
            store_len,
            end,
        ));
    }
    Ok(())
}

/// Vec-backed store
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemStore {
    data: Vec<u8>,
}

impl MemStore {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemStore {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteStore for MemStore {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        check_range("memory store", self.len(), offset, len)?;
        let start = offset as usize;
        Ok(Cow::Borrowed(&self.data[start..start + len]))
    }
}

impl AppendStore for MemStore {
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }
}

/// File-backed append-only store.
///
/// Reads seek under a lock so a shared reference can serve concurrent readers.
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl FileStore {
    /// Open for appending, creating the file (and parent dirs) if missing
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path,
            file: Mutex::new(file),
            len,
        })
    }

    /// Open an existing file read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path,
            file: Mutex::new(file),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and fsync
    pub fn sync(&mut self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        check_range(&self.path.display().to_string(), self.len, offset, len)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(Cow::Owned(buf))
    }
}

impl AppendStore for FileStore {
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.len;
        let mut file = self.file.lock();
        file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.lock().flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}
