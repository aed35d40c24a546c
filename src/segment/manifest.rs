//! Segments file: the committed list of live segments
//!
//! Commit protocol:
//! 1. Write the new segment files and finish them
//! 2. Write `pending_segments_<gen>` and sync it
//! 3. Rename it to `segments_<gen>` and sync the directory
//!
//! Readers take the highest generation present, so a crash mid-commit leaves
//! the previous generation as the visible state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{compound_file_name, deletes_file_name};
use crate::error::{Result, SegdexError};
use crate::store::Directory;

pub const SEGMENTS_PREFIX: &str = "segments_";
pub const PENDING_SEGMENTS_PREFIX: &str = "pending_segments_";

/// One committed segment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub doc_count: u32,
    /// Generation of the deletion file; 0 means no deletions
    pub del_gen: u64,
    pub del_count: u32,
    /// Size of the compound file
    pub size_bytes: u64,
}

impl SegmentInfo {
    pub fn new(name: impl Into<String>, doc_count: u32, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            doc_count,
            del_gen: 0,
            del_count: 0,
            size_bytes,
        }
    }

    pub fn live_docs(&self) -> u32 {
        self.doc_count.saturating_sub(self.del_count)
    }

    pub fn has_deletions(&self) -> bool {
        self.del_gen > 0 && self.del_count > 0
    }

    pub fn delete_ratio(&self) -> f64 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.del_count as f64 / self.doc_count as f64
    }

    pub fn deletes_file(&self) -> Option<String> {
        (self.del_gen > 0).then(|| deletes_file_name(&self.name, self.del_gen))
    }

    /// Every file backing this segment
    pub fn files(&self) -> Vec<String> {
        let mut files = vec![compound_file_name(&self.name)];
        files.extend(self.deletes_file());
        files
    }
}

/// Contents of a segments file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfos {
    pub format: u32,
    /// Generation of the segments file this was read from or last written to
    pub generation: u64,
    /// Next value used to name a segment
    pub counter: u64,
    /// Bumped on every change, committed or not
    pub version: u64,
    pub segments: Vec<SegmentInfo>,
}

impl Default for SegmentInfos {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentInfos {
    pub const FORMAT: u32 = 1;

    pub fn new() -> Self {
        Self {
            format: Self::FORMAT,
            generation: 0,
            counter: 0,
            version: 0,
            segments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentInfo> {
        self.segments.iter()
    }

    pub fn get(&self, name: &str) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SegmentInfo> {
        self.segments.iter_mut().find(|s| s.name == name)
    }

    /// Documents including deleted ones
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_docs() as u64).sum()
    }

    pub fn push(&mut self, info: SegmentInfo) {
        self.segments.push(info);
        self.version += 1;
    }

    /// Replace the named segments with `merged` at the position of the first.
    /// A `None` merged segment drops them entirely.
    pub fn replace(&mut self, names: &[String], merged: Option<SegmentInfo>) -> Result<()> {
        let first = self
            .segments
            .iter()
            .position(|s| names.contains(&s.name))
            .ok_or_else(|| SegdexError::Internal("merged segments are not live".to_string()))?;
        let before = self.segments.len();
        self.segments.retain(|s| !names.contains(&s.name));
        if before - self.segments.len() != names.len() {
            return Err(SegdexError::Internal(
                "merged segments changed during merge".to_string(),
            ));
        }
        if let Some(info) = merged {
            self.segments.insert(first, info);
        }
        self.version += 1;
        Ok(())
    }

    /// Allocate a fresh segment name
    pub fn next_segment_name(&mut self) -> String {
        let name = super::types::segment_name(self.counter);
        self.counter += 1;
        name
    }

    /// Files referenced by this commit, the segments file excluded
    pub fn files(&self) -> Vec<String> {
        self.segments.iter().flat_map(|s| s.files()).collect()
    }

    pub fn segments_file(&self) -> String {
        segments_file_name(self.generation)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = bincode::serialize(self)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(SegdexError::corrupt("segments file too short"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(trailer);
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(SegdexError::corrupt("segments file checksum mismatch"));
        }
        let infos: SegmentInfos = bincode::deserialize(body)
            .map_err(|e| SegdexError::corrupt(format!("segments file: {}", e)))?;
        if infos.format != Self::FORMAT {
            return Err(SegdexError::corrupt(format!(
                "unsupported segments format {}",
                infos.format
            )));
        }
        Ok(infos)
    }

    /// Read a specific generation
    pub fn read(directory: &dyn Directory, generation: u64) -> Result<Self> {
        let data = directory.open_file(&segments_file_name(generation))?;
        let mut infos = Self::from_bytes(&data)?;
        infos.generation = generation;
        Ok(infos)
    }

    /// Read the most recent commit, if there is one
    pub fn read_latest(directory: &dyn Directory) -> Result<Option<Self>> {
        match latest_generation(&directory.list_files()?) {
            Some(generation) => Ok(Some(Self::read(directory, generation)?)),
            None => Ok(None),
        }
    }

    /// Write the next generation: pending file, sync, rename, sync.
    /// Returns the name of the new segments file.
    pub fn commit(&mut self, directory: &dyn Directory) -> Result<String> {
        let generation = self.generation + 1;
        let pending = format!("{}{}", PENDING_SEGMENTS_PREFIX, generation);
        let target = segments_file_name(generation);

        let mut to_write = self.clone();
        to_write.generation = generation;
        directory.write_file(&pending, &to_write.to_bytes()?)?;

        let mut to_sync = self.files();
        to_sync.push(pending.clone());
        if let Err(e) = directory
            .sync(&to_sync)
            .and_then(|_| directory.rename_file(&pending, &target))
        {
            let _ = directory.delete_file(&pending);
            return Err(e);
        }
        directory.sync(&[target.clone()])?;

        self.generation = generation;
        debug!(generation, segments = self.segments.len(), "wrote segments file");
        Ok(target)
    }
}

pub fn segments_file_name(generation: u64) -> String {
    format!("{}{}", SEGMENTS_PREFIX, generation)
}

/// Generation of a `segments_<gen>` file name
pub fn parse_segments_generation(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENTS_PREFIX)?.parse().ok()
}

pub fn latest_generation(files: &[String]) -> Option<u64> {
    files
        .iter()
        .filter_map(|f| parse_segments_generation(f))
        .max()
}

/// Atomically published segment list, readable without locking
pub struct SegmentInfosHolder {
    inner: arc_swap::ArcSwap<SegmentInfos>,
}

impl SegmentInfosHolder {
    pub fn new(infos: SegmentInfos) -> Self {
        Self {
            inner: arc_swap::ArcSwap::from_pointee(infos),
        }
    }

    pub fn load(&self) -> Arc<SegmentInfos> {
        self.inner.load_full()
    }

    pub fn snapshot(&self) -> SegmentInfos {
        (**self.inner.load()).clone()
    }

    pub fn store(&self, infos: SegmentInfos) {
        self.inner.store(Arc::new(infos));
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SegmentInfos),
    {
        let mut infos = self.snapshot();
        f(&mut infos);
        self.store(infos);
    }
}

impl Default for SegmentInfosHolder {
    fn default() -> Self {
        Self::new(SegmentInfos::new())
    }
}

impl std::fmt::Debug for SegmentInfosHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let infos = self.inner.load();
        f.debug_struct("SegmentInfosHolder")
            .field("generation", &infos.generation)
            .field("segments", &infos.segments.len())
            .finish()
    }
}
