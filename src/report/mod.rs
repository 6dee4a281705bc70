//! Report rendering: the audit document and its charts.

pub mod charts;
pub mod generator;

pub use charts::render_charts;
pub use generator::{generate_json_report, generate_markdown_report};
