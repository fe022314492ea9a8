//! Daemon: the watch loop and the scheduled wipe it drives.

pub mod loop_main;
pub mod schedule;
