//! Reference counting of index files
//!
//! Every holder of a file (the latest commit, a writer's working segment
//! list, an open reader) takes a reference on it. A file is physically
//! deleted once its count drops to zero. Deletes that fail, for example
//! because the platform refuses to remove an open file, are retried on the
//! next checkpoint.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::segment::{parse_segments_generation, segment_of_file, PENDING_SEGMENTS_PREFIX};
use crate::store::Directory;

#[derive(Debug, Default)]
struct DeleterState {
    refs: HashMap<String, usize>,
    /// Unreferenced files whose deletion failed
    pending: BTreeSet<String>,
    /// Files of the latest commit, the segments file included
    commit: Vec<String>,
}

/// Registry of file references for one index, shared by its writer and
/// readers
#[derive(Debug)]
pub struct FileDeleter {
    directory: Arc<dyn Directory>,
    state: Mutex<DeleterState>,
}

impl FileDeleter {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            state: Mutex::new(DeleterState::default()),
        }
    }

    pub fn inc_ref(&self, files: &[String]) {
        let mut state = self.state.lock();
        for file in files {
            *state.refs.entry(file.clone()).or_insert(0) += 1;
            state.pending.remove(file);
        }
    }

    /// Drop one reference per file, deleting files that reach zero
    pub fn dec_ref(&self, files: &[String]) {
        let mut state = self.state.lock();
        self.dec_ref_locked(&mut state, files);
    }

    fn dec_ref_locked(&self, state: &mut DeleterState, files: &[String]) {
        for file in files {
            let remaining = match state.refs.get_mut(file) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => {
                    warn!(file = %file, "released a file that holds no reference");
                    continue;
                }
            };
            if remaining == 0 {
                state.refs.remove(file);
                self.delete_locked(state, file);
            }
        }
    }

    /// Move references from `old` to `new`. Files in both keep their count.
    pub fn swap_refs(&self, old: &[String], new: &[String]) {
        let mut state = self.state.lock();
        for file in new {
            *state.refs.entry(file.clone()).or_insert(0) += 1;
            state.pending.remove(file);
        }
        self.dec_ref_locked(&mut state, old);
        self.retry_locked(&mut state);
    }

    /// Record a new commit: its files gain the commit reference, the
    /// previous commit's files lose it
    pub fn checkpoint_commit(&self, files: Vec<String>) {
        let previous = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.commit)
        };
        self.swap_refs(&previous, &files);
        self.state.lock().commit = files;
    }

    /// Files of the latest recorded commit
    pub fn commit_files(&self) -> Vec<String> {
        self.state.lock().commit.clone()
    }

    pub fn ref_count(&self, file: &str) -> usize {
        self.state.lock().refs.get(file).copied().unwrap_or(0)
    }

    pub fn pending_files(&self) -> Vec<String> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Delete index files in the directory that nothing references, such as
    /// leftovers of an interrupted flush or merge
    pub fn delete_unreferenced(&self) -> Result<usize> {
        let files = self.directory.list_files()?;
        let mut state = self.state.lock();
        let mut deleted = 0;
        for file in files {
            if !is_index_file(&file) || state.refs.contains_key(&file) {
                continue;
            }
            if self.delete_locked(&mut state, &file) {
                deleted += 1;
            }
        }
        if deleted > 0 {
            debug!(deleted, "removed unreferenced index files");
        }
        Ok(deleted)
    }

    /// Retry deletes that failed earlier
    pub fn retry_pending(&self) {
        let mut state = self.state.lock();
        self.retry_locked(&mut state);
    }

    fn retry_locked(&self, state: &mut DeleterState) {
        if state.pending.is_empty() {
            return;
        }
        let pending: Vec<String> = state.pending.iter().cloned().collect();
        for file in pending {
            if !state.refs.contains_key(&file) {
                self.delete_locked(state, &file);
            }
        }
    }

    fn delete_locked(&self, state: &mut DeleterState, file: &str) -> bool {
        if !self.directory.exists(file) {
            state.pending.remove(file);
            return false;
        }
        match self.directory.delete_file(file) {
            Ok(()) => {
                state.pending.remove(file);
                debug!(file = %file, "deleted index file");
                true
            }
            Err(e) => {
                warn!(file = %file, error = %e, "could not delete file, will retry");
                state.pending.insert(file.to_string());
                false
            }
        }
    }
}

/// Files this crate writes: segment files and segments files
fn is_index_file(name: &str) -> bool {
    segment_of_file(name).is_some()
        || parse_segments_generation(name).is_some()
        || name.starts_with(PENDING_SEGMENTS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RamDirectory;

    fn setup(files: &[&str]) -> (Arc<RamDirectory>, FileDeleter) {
        let dir = Arc::new(RamDirectory::new());
        for file in files {
            dir.write_file(file, b"x").unwrap();
        }
        let deleter = FileDeleter::new(dir.clone());
        (dir, deleter)
    }

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_file_deleted_when_last_ref_dropped() {
        let (dir, deleter) = setup(&["_0.cfs"]);
        let files = names(&["_0.cfs"]);
        deleter.inc_ref(&files);
        deleter.inc_ref(&files);
        deleter.dec_ref(&files);
        assert!(dir.exists("_0.cfs"));
        assert_eq!(deleter.ref_count("_0.cfs"), 1);
        deleter.dec_ref(&files);
        assert!(!dir.exists("_0.cfs"));
        assert_eq!(deleter.ref_count("_0.cfs"), 0);
    }

    #[test]
    fn test_commit_checkpoint_keeps_reader_files() {
        let (dir, deleter) = setup(&["_0.cfs", "_1.cfs", "segments_1", "segments_2"]);
        deleter.checkpoint_commit(names(&["_0.cfs", "segments_1"]));

        // a reader holds the first commit's segment
        let reader_files = names(&["_0.cfs"]);
        deleter.inc_ref(&reader_files);

        deleter.checkpoint_commit(names(&["_1.cfs", "segments_2"]));
        assert!(dir.exists("_0.cfs"));
        assert!(!dir.exists("segments_1"));

        deleter.dec_ref(&reader_files);
        assert!(!dir.exists("_0.cfs"));
        assert!(dir.exists("_1.cfs"));
        assert_eq!(deleter.commit_files(), names(&["_1.cfs", "segments_2"]));
    }

    #[test]
    fn test_swap_refs_keeps_shared_files() {
        let (dir, deleter) = setup(&["_0.cfs", "_1.cfs", "_2.cfs"]);
        deleter.inc_ref(&names(&["_0.cfs", "_1.cfs"]));
        deleter.swap_refs(&names(&["_0.cfs", "_1.cfs"]), &names(&["_1.cfs", "_2.cfs"]));
        assert!(!dir.exists("_0.cfs"));
        assert_eq!(deleter.ref_count("_1.cfs"), 1);
        assert_eq!(deleter.ref_count("_2.cfs"), 1);
    }

    #[test]
    fn test_delete_unreferenced_skips_foreign_files() {
        let (dir, deleter) = setup(&["_0.cfs", "_3.cfs", "segments_1", "write.lock", "notes.txt"]);
        deleter.checkpoint_commit(names(&["_0.cfs", "segments_1"]));
        assert_eq!(deleter.delete_unreferenced().unwrap(), 1);
        assert!(!dir.exists("_3.cfs"));
        assert!(dir.exists("_0.cfs"));
        assert!(dir.exists("write.lock"));
        assert!(dir.exists("notes.txt"));
    }
}
