//! Shared data structures

mod bit_vector;
mod priority_queue;

pub use bit_vector::*;
pub use priority_queue::*;
