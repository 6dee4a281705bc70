//! Chart rendering.
//!
//! Charts are simple SVG bar charts written next to each other in one
//! directory. Rendering is best effort: any failure is logged and yields
//! an empty chart map.

use crate::models::{AuditReport, CombinedAnalysis, SeverityCounts};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, error};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 400;
const MARGIN: u32 = 50;

/// Render every chart into `dir`, returning chart name to file path.
pub fn render_charts(
    report: &AuditReport,
    analysis: &CombinedAnalysis,
    dir: &Path,
) -> BTreeMap<String, String> {
    match try_render_charts(report, analysis, dir) {
        Ok(charts) => charts,
        Err(e) => {
            error!("Chart generation failed: {:#}", e);
            BTreeMap::new()
        }
    }
}

fn try_render_charts(
    report: &AuditReport,
    analysis: &CombinedAnalysis,
    dir: &Path,
) -> Result<BTreeMap<String, String>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create chart directory: {}", dir.display()))?;

    let charts = [
        (
            "severity",
            "Exception Severity Distribution",
            SeverityCounts::from_exceptions(&report.exceptions),
        ),
        (
            "findings",
            "Findings by Risk Level",
            SeverityCounts::from_findings(&analysis.findings),
        ),
    ];

    let mut paths = BTreeMap::new();
    for (name, title, counts) in charts {
        let path = dir.join(format!("{}.svg", name));
        std::fs::write(&path, bar_chart_svg(title, &counts.bars()))
            .with_context(|| format!("Failed to write chart: {}", path.display()))?;
        debug!("Wrote chart {}", path.display());
        paths.insert(name.to_string(), path.display().to_string().replace('\\', "/"));
    }

    Ok(paths)
}

/// Draw a labelled vertical bar chart as an SVG document.
pub fn bar_chart_svg(title: &str, bars: &[(&str, usize)]) -> String {
    let mut svg = String::new();
    let plot_width = WIDTH - 2 * MARGIN;
    let plot_height = HEIGHT - 2 * MARGIN;
    let max = bars.iter().map(|(_, count)| *count).max().unwrap_or(0).max(1);
    let slot = plot_width / bars.len().max(1) as u32;
    let bar_width = slot * 3 / 5;
    let baseline = HEIGHT - MARGIN;

    // Writing into a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="30" font-family="sans-serif" font-size="18" text-anchor="middle">{}</text>"#,
        WIDTH / 2,
        escape(title)
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{MARGIN}" y1="{baseline}" x2="{}" y2="{baseline}" stroke="black"/>"#,
        WIDTH - MARGIN
    );

    for (i, (label, count)) in bars.iter().enumerate() {
        let height = (*count as u64 * plot_height as u64 / max as u64) as u32;
        let x = MARGIN + i as u32 * slot + (slot - bar_width) / 2;
        let center = x + bar_width / 2;
        let _ = writeln!(
            svg,
            r##"<rect x="{x}" y="{}" width="{bar_width}" height="{height}" fill="#1f77b4"/>"##,
            baseline - height
        );
        let _ = writeln!(
            svg,
            r#"<text x="{center}" y="{}" font-family="sans-serif" font-size="14" text-anchor="middle">{}</text>"#,
            baseline + 20,
            escape(label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="{center}" y="{}" font-family="sans-serif" font-size="12" text-anchor="middle">{count}</text>"#,
            baseline - height - 6
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
