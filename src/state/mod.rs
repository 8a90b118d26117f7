//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the phase a unit of work is in (select, load, validate, ...)
//! - `ResourceClass`: which kind of page a worker processes
//! - `UnitOfWork`: the per-unit value object passed through the machine

mod phase;
mod unit;

// Re-export main types
pub use phase::CrawlPhase;
pub use unit::{ResourceClass, UnitOfWork, UnitOutcome};
