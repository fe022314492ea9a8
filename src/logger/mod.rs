//! Logging: JSONL activity log on a background thread, plus the error journal.

pub mod activity;
pub mod journal;
pub mod jsonl;
