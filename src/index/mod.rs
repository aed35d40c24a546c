//! Index lifecycle: writers, point-in-time readers and file reference
//! counting
//!
//! # Architecture
//!
//! - `Index`: a directory plus the `FileDeleter` its writers and readers share
//! - `IndexWriter`: buffers, deletes, flushes, merges and commits
//! - `IndexReader`: immutable snapshot of one commit
//! - `FileDeleter`: deletes files once neither a commit, a writer nor a reader
//!   needs them

mod file_deleter;
mod reader;
mod writer;

pub use file_deleter::*;
pub use reader::*;
pub use writer::*;

use std::path::Path;
use std::sync::Arc;

use crate::config::IndexWriterConfig;
use crate::error::Result;
use crate::search::IndexSearcher;
use crate::segment::{MergePolicy, TieredMergePolicy};
use crate::store::{Directory, FsDirectory, RamDirectory};
use crate::tokenizer::{Analyzer, Tokenizer};

/// Entry point for one index location
#[derive(Clone, Debug)]
pub struct Index {
    directory: Arc<dyn Directory>,
    deleter: Arc<FileDeleter>,
    analyzer: Option<Arc<dyn Analyzer>>,
}

impl Index {
    pub fn open(directory: Arc<dyn Directory>) -> Self {
        let deleter = Arc::new(FileDeleter::new(Arc::clone(&directory)));
        Self {
            directory,
            deleter,
            analyzer: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Arc::new(RamDirectory::new()))
    }

    /// Index stored in `path`, created if missing
    pub fn open_in_dir(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::open(Arc::new(FsDirectory::open(path)?)))
    }

    /// Analyzer used by writers instead of one built from the tokenizer config
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn deleter(&self) -> &Arc<FileDeleter> {
        &self.deleter
    }

    /// Analyzer writers created with `config` use
    pub fn analyzer(&self, config: &IndexWriterConfig) -> Arc<dyn Analyzer> {
        match &self.analyzer {
            Some(analyzer) => Arc::clone(analyzer),
            None => Arc::new(Tokenizer::new(&config.tokenizer)),
        }
    }

    /// Open a writer with the tiered merge policy from `config`
    pub fn writer(&self, config: IndexWriterConfig) -> Result<IndexWriter> {
        let policy = Arc::new(TieredMergePolicy::new(config.merge_policy.clone()));
        self.writer_with_policy(config, policy)
    }

    pub fn writer_with_policy(
        &self,
        config: IndexWriterConfig,
        policy: Arc<dyn MergePolicy>,
    ) -> Result<IndexWriter> {
        let analyzer = self.analyzer(&config);
        IndexWriter::open(
            Arc::clone(&self.directory),
            Arc::clone(&self.deleter),
            config,
            analyzer,
            policy,
        )
    }

    /// Reader over the latest commit
    pub fn reader(&self) -> Result<Arc<IndexReader>> {
        let reader = IndexReader::open(Arc::clone(&self.directory), Some(Arc::clone(&self.deleter)))?;
        Ok(Arc::new(reader))
    }

    pub fn searcher(&self) -> Result<IndexSearcher> {
        Ok(IndexSearcher::new(self.reader()?))
    }
}
