//! Immutable segments: codecs, writer, reader and merger
//!
//! # Architecture
//!
//! - `SegmentBuffer`: in-memory builder for recently added documents
//! - `SegmentWriter`: packs a buffer into a compound `_N.cfs` file
//! - `SegmentReader`: decoded segment plus a copy-on-write deletion snapshot
//! - `SegmentMerger`: k-way merge of several segments into one
//! - `SegmentInfos`: the committed `segments_<gen>` list
//! - `MergePolicy`: chooses which segments to merge

mod types;
mod codec;
mod postings;
mod term_dict;
mod field_infos;
mod norms;
mod stored;
mod term_vectors;
mod buffer;
mod writer;
mod reader;
mod merger;
mod merge;
mod manifest;

pub use types::*;
pub use codec::*;
pub use postings::*;
pub use term_dict::*;
pub use field_infos::*;
pub use norms::*;
pub use stored::*;
pub use term_vectors::*;
pub use buffer::*;
pub use writer::*;
pub use reader::*;
pub use merger::*;
pub use merge::*;
pub use manifest::*;
