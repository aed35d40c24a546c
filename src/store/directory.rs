use std::fmt;
use std::io::{self, Write};
use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::error::Result;

/// Immutable, cheaply clonable view over a byte range of a file
#[derive(Clone)]
pub struct FileSlice {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl fmt::Debug for FileSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSlice")
            .field("range", &self.range)
            .finish()
    }
}

impl Default for FileSlice {
    fn default() -> Self {
        Self::empty()
    }
}

impl FileSlice {
    pub fn new(data: Vec<u8>) -> Self {
        Self::from_arc(Arc::new(data))
    }

    pub fn from_arc(data: Arc<Vec<u8>>) -> Self {
        let len = data.len();
        Self {
            data,
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Sub-range relative to this slice, or None if it does not fit
    pub fn slice(&self, range: Range<usize>) -> Option<FileSlice> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        Some(Self {
            data: Arc::clone(&self.data),
            range: self.range.start + range.start..self.range.start + range.end,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl AsRef<[u8]> for FileSlice {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for FileSlice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

/// A writer for incrementally writing a directory file.
///
/// The file becomes visible to readers once `finish` returns.
pub trait FileWriter: io::Write + Send {
    fn finish(self: Box<Self>) -> io::Result<()>;

    /// Bytes written so far
    fn bytes_written(&self) -> u64;
}

/// Held exclusive lock; dropping it releases the lock
pub struct DirectoryLock(Box<dyn Send + Sync + 'static>);

impl DirectoryLock {
    pub fn new(guard: Box<dyn Send + Sync + 'static>) -> Self {
        Self(guard)
    }
}

impl fmt::Debug for DirectoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DirectoryLock")
    }
}

/// Flat namespace of named files plus an advisory exclusive lock.
///
/// Both the in-memory and on-disk implementations must behave the same way.
pub trait Directory: Send + Sync + fmt::Debug {
    fn exists(&self, name: &str) -> bool;

    fn file_len(&self, name: &str) -> Result<u64>;

    /// Read the whole file
    fn open_file(&self, name: &str) -> Result<FileSlice>;

    /// Create or truncate a file for streaming writes
    fn create_output(&self, name: &str) -> Result<Box<dyn FileWriter>>;

    /// Create or overwrite a file with `data`
    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut out = self.create_output(name)?;
        out.write_all(data)?;
        out.finish()?;
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically replace `to` with `from`
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;

    /// Make the named files durable
    fn sync(&self, names: &[String]) -> Result<()>;

    /// Take the named exclusive lock; fails with `LockContention` if held
    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock>;
}

/// Name of the lock held by an open IndexWriter
pub const WRITE_LOCK_NAME: &str = "write.lock";
