//! Analysis modules.
//!
//! The aggregation fold that turns accident records into per-region
//! statistics.

pub mod aggregator;

pub use aggregator::*;
