//! Query model, scoring and search execution
//!
//! # Architecture
//!
//! - `Query`: closed set of query variants plus a custom escape hatch
//! - `Weight`: per-search compiled query built from collection statistics
//! - `Scorer`: per-segment iterator of matching docs in ascending order
//! - `Similarity`: the scoring formula
//! - `IndexSearcher` / `MultiSearcher`: run weights and collect top hits
//! - `Sort`: optional field order replacing relevance

mod similarity;
mod weight;
mod query;
mod term;
pub(crate) mod boolean;
mod phrase;
mod span;
mod multi_term;
mod filter;
mod constant;
mod collector;
mod sort;
mod searcher;
mod multi_searcher;

pub use similarity::*;
pub use weight::*;
pub use query::*;
pub use term::*;
pub use boolean::*;
pub use phrase::*;
pub use span::*;
pub use multi_term::*;
pub use filter::*;
pub use constant::*;
pub use collector::*;
pub use sort::*;
pub use searcher::*;
pub use multi_searcher::*;
