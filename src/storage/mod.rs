//! Storage module
//!
//! Block bookkeeping and the positional output file.

pub mod file;
pub mod pieces;

pub use file::OutputFile;
pub use pieces::PieceTracker;
