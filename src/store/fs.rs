use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::directory::{Directory, DirectoryLock, FileSlice, FileWriter};
use crate::error::{Result, SegdexError};

/// Directory backed by a local filesystem folder
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Open (creating if needed) the folder at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

struct FsFileWriter {
    file: File,
    written: u64,
}

impl io::Write for FsFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl FileWriter for FsFileWriter {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Lock file removed when dropped
struct FsLockGuard {
    path: PathBuf,
}

impl Drop for FsLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl Directory for FsDirectory {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(name))?.len())
    }

    fn open_file(&self, name: &str) -> Result<FileSlice> {
        let data = fs::read(self.resolve(name))?;
        Ok(FileSlice::from_arc(Arc::new(data)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn FileWriter>> {
        let file = File::create(self.resolve(name))?;
        Ok(Box::new(FsFileWriter { file, written: 0 }))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.resolve(name))?;
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        for name in names {
            let path = self.resolve(name);
            if path.is_file() {
                File::open(&path)?.sync_all()?;
            }
        }
        // Persist renames and new directory entries
        #[cfg(unix)]
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    fn obtain_lock(&self, name: &str) -> Result<DirectoryLock> {
        let path = self.resolve(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(DirectoryLock::new(Box::new(FsLockGuard { path })))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(SegdexError::LockContention(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_directory_operations() {
        let tmp = TempDir::new().unwrap();
        let dir = FsDirectory::open(tmp.path().join("idx")).unwrap();

        dir.write_file("_0.cfs", b"data").unwrap();
        assert!(dir.exists("_0.cfs"));
        assert_eq!(dir.file_len("_0.cfs").unwrap(), 4);
        assert_eq!(dir.open_file("_0.cfs").unwrap().to_vec(), b"data".to_vec());

        dir.rename_file("_0.cfs", "_1.cfs").unwrap();
        assert_eq!(dir.list_files().unwrap(), vec!["_1.cfs".to_string()]);
        dir.sync(&["_1.cfs".to_string()]).unwrap();

        dir.delete_file("_1.cfs").unwrap();
        assert!(dir.list_files().unwrap().is_empty());
        assert!(dir.open_file("_1.cfs").is_err());
    }

    #[test]
    fn test_fs_lock_is_exclusive_across_instances() {
        let tmp = TempDir::new().unwrap();
        let a = FsDirectory::open(tmp.path()).unwrap();
        let b = FsDirectory::open(tmp.path()).unwrap();

        let lock = a.obtain_lock("write.lock").unwrap();
        assert!(matches!(
            b.obtain_lock("write.lock"),
            Err(SegdexError::LockContention(_))
        ));
        drop(lock);
        assert!(b.obtain_lock("write.lock").is_ok());
    }
}
