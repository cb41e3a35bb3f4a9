//! Report rendering
//!
//! - `text`: console reports (timing table, area summary)
//! - `json`: serde_json form of the timing report

pub mod json;
pub mod text;
