//! Embeddable segmented full-text indexing and search
//!
//! Documents are analyzed into an inverted index made of immutable
//! segments. An [`IndexWriter`] buffers documents and deletes, flushes them
//! into new segments, merges segments in the background and publishes
//! commits. [`IndexReader`]s are point-in-time snapshots of one commit,
//! searched through an [`IndexSearcher`].
//!
//! ```no_run
//! use segdex::{Document, Field, Index, IndexWriterConfig, QueryParser};
//!
//! # fn main() -> segdex::Result<()> {
//! let index = Index::in_memory();
//! let writer = index.writer(IndexWriterConfig::default())?;
//! writer.add_document(Document::new().add_field(Field::text("body", "the quick brown fox")))?;
//! writer.commit()?;
//!
//! let query = QueryParser::new("body").parse("quick AND fox")?;
//! let hits = index.searcher()?.top(&query, 10)?;
//! assert_eq!(hits.total_hits, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod query_parser;
pub mod search;
pub mod segment;
pub mod store;
pub mod tokenizer;
pub mod util;

pub use config::{
    IndexWriterConfig, MergePolicyConfig, MergeSchedulerKind, OpenMode, TokenizerConfig,
    WriterProfile,
};
pub use document::{Document, Field, FieldFlags, Term};
pub use error::{Result, SegdexError};
pub use index::{DeleteSelector, Index, IndexReader, IndexWriter};
pub use query_parser::{DefaultOperator, QueryParser};
pub use search::{
    IndexSearcher, MultiSearcher, Query, ScoreDoc, SearchOptions, Searchable, Sort, SortField,
    TopDocs,
};
pub use store::{Directory, FsDirectory, RamDirectory};
pub use tokenizer::{Analyzer, Tokenizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
