//! Run-scoped workspace staging around an external flow command.
//!
//! Every run copies an input directory into a fresh, timestamp-named
//! workspace, lets an external flow mutate that workspace, and then copies
//! what the flow generated into a matching output directory.
//!
//! - **[`core`]**: Pure logic (run ids, snapshots, the diff rule). No I/O.
//! - **[`io`]**: Filesystem walking and copying, config loading, run state
//!   persistence, and child process execution.
//!
//! [`stager`] implements `prepare`/`finalize`, [`flow`] invokes the external
//! command, and [`run`] ties them together for the CLI.

pub mod cli;
pub mod core;
pub mod exit_codes;
pub mod flow;
pub mod io;
pub mod logging;
pub mod run;
pub mod stager;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
