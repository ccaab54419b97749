// Media processing pipeline
//
// - commands: argument list builder shared by all stages
// - filter: pure filter graph and stage argument construction
// - vfs: bridge into the engine's private filesystem
// - stages: ordered stage plan and its executor

pub mod commands;
pub mod filter;
pub mod stages;
pub mod vfs;

pub use commands::*;
pub use filter::*;
pub use stages::*;
pub use vfs::*;
