//! Pure staging logic.

pub mod diff;
pub mod run_id;
pub mod snapshot;
