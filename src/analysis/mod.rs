//! Batch analysis modules.
//!
//! The batcher splits a report into prompts, the dispatcher sends them to
//! the inference service concurrently, and the aggregator merges the
//! outcomes. [`AnalysisPipeline`] runs the three in order.

pub mod aggregator;
pub mod batcher;
pub mod dispatcher;
pub mod pipeline;

pub use dispatcher::{BatchOutcome, DispatchConfig, Dispatcher};
pub use pipeline::AnalysisPipeline;
