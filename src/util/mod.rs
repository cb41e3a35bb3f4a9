//! Shared helpers

pub mod format;
pub mod time;
