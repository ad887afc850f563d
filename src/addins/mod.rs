//! Built-in add-ins
//!
//! - `text`: line-oriented parser usable for any text file type
//! - `pattern`: analyzer checking regex rules declared in module manifests

mod pattern;
mod text;

pub use pattern::PatternAnalyzer;
pub use text::{TextModel, TextParser};
