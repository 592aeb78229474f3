//! Side-effecting helpers: filesystem, config, run state, child processes.

pub mod config;
pub mod process;
pub mod prompt;
pub mod state;
pub mod tree;
