use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

use super::directory::{Directory, DirectoryLock, FileSlice, FileWriter};
use crate::error::{Result, SegdexError};

type FileMap = Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>;

/// In-memory directory for testing and small indexes.
///
/// Clones share the same files and locks.
#[derive(Debug, Default, Clone)]
pub struct RamDirectory {
    files: FileMap,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl RamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes held
    pub fn size_in_bytes(&self) -> u64 {
        self.files.read().values().map(|d| d.len() as u64).sum()
    }
}

fn not_found(name: &str) -> SegdexError {
    SegdexError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("file not found: {}", name),
    ))
}

/// Buffers in memory and publishes the file on finish
struct RamFileWriter {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
}

impl io::Write for RamFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileWriter for RamFileWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.files.write().insert(self.name, Arc::new(self.buffer));
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }
}

struct RamLockGuard {
    name: String,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RamLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.name);
    }
}

impl Directory for RamDirectory {
    fn exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        self.files
            .read()
            .get(name)
            .map(|d| d.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn open_file(&self, name: &str) -> Result<FileSlice> {
        self.files
            .read()
            .get(name)
            .map(|d| FileSlice::from_arc(Arc::clone(d)))
            .ok_or_else(|| not_found(name))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn FileWriter>> {
        Ok(Box::new(RamFileWriter {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .write()
            .insert(name.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(not_found(name)),
        }
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.write();
        let data = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn sync(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock> {
        let mut locks = self.locks.lock();
        if !locks.insert(name.to_string()) {
            return Err(SegdexError::LockContention(name.to_string()));
        }
        Ok(DirectoryLock::new(Box::new(RamLockGuard {
            name: name.to_string(),
            locks: Arc::clone(&self.locks),
        })))
    }
}
