//! Command-line adapter.
//!
//! Turns manifest operation paths into nested subcommands and runs the
//! invoked leaf against the backend:
//!
//! - [`tree`]: arena of path segments shared across operations
//! - [`command`]: `clap` rendering of the tree and flag extraction
//! - [`executor`]: argument resolution, request, output
//! - [`wait`]: `--wait` job polling

pub mod command;
pub mod executor;
pub mod tree;
pub mod wait;

pub use command::{build_commands, find_leaf, invocation_from_matches, LeafInvocation, STATIC_COMMANDS};
pub use executor::Executor;
pub use tree::CommandTree;

/// Most positional fields one operation may declare.
pub const MAX_POSITIONAL_ARGS: usize = 8;

/// Flag names every leaf may carry; no field or switch may reuse them.
pub const RESERVED_FLAGS: [&str; 5] = ["json", "file", "cid", "wait", "help"];
