//! Reference corpus assembled from the office documents under the data directory.

pub mod builder;
pub mod extract;

pub use builder::{IngestLimits, IngestReport, KnowledgeBase};
