//! Text analysis collaborators

mod analyzer;
#[allow(clippy::module_inception)]
mod tokenizer;

pub use analyzer::*;
pub use tokenizer::*;
