//! Scanner: enumerate the watch root, inspect containers, delete what is safe.

pub mod classifier;
pub mod deletion;
pub mod probe;
pub mod sweep;
pub mod walker;
