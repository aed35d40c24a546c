//! Query string parsing
//!
//! Turns strings like `title:rust AND (body:"fast search"~2 OR tags:db*)`
//! into [`Query`](crate::search::Query) trees. Unqualified terms go to the
//! parser's default fields and are run through its analyzer.

mod lexer;
mod parser;

pub use lexer::{Lexer, Spanned, Token};
pub use parser::*;
