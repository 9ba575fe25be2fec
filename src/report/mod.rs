//! Output modules.
//!
//! The JSON document consumed by the dashboard and the store loader, and a
//! Markdown summary rendered from it.

pub mod document;
pub mod summary;

pub use document::{read_document, write_document, AccidentDocument};
pub use summary::{write_summary, SummaryMetadata, SummaryOptions};
