//! Storage backends and the compound file container

mod compound;
mod directory;
mod fs;
mod ram;

pub use compound::*;
pub use directory::*;
pub use fs::*;
pub use ram::*;
