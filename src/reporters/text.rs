use crate::reporters::{Renderer, common_root, relative};
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, CoverageSummary, Totals};
use std::fmt::Write as _;
use std::path::Path;

/// Per-file table of coverage percentages and uncovered lines
#[derive(Debug, Clone)]
pub struct TextReport {
    file: String,
}

impl TextReport {
    /// `file` is the artifact name, usually the reporter name itself
    pub fn new(file: &str) -> Self {
        TextReport {
            file: file.to_string(),
        }
    }
}

/// Collapse sorted line numbers into `1-3,7` style ranges
fn line_ranges(lines: &[u32]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = lines.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }
    parts.join(",")
}

fn pct(totals: Totals) -> String {
    let pct = totals.pct();
    if pct.fract() == 0.0 {
        format!("{}", pct as u64)
    } else {
        format!("{:.2}", pct)
    }
}

fn row(name: &str, summary: &CoverageSummary, uncovered: &str, width: usize) -> String {
    format!(
        "{:<width$} | {:>7} | {:>8} | {:>7} | {:>7} | {:<17}",
        name,
        pct(summary.statements),
        pct(summary.branches),
        pct(summary.functions),
        pct(summary.lines),
        uncovered,
        width = width
    )
}

impl Renderer for TextReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let root = common_root(map);
        let names: Vec<String> = map
            .files
            .keys()
            .map(|path| format!(" {}", relative(path, &root)))
            .collect();
        let width = names
            .iter()
            .map(String::len)
            .chain(std::iter::once("All files".len()))
            .max()
            .unwrap_or(0);

        let divider = format!(
            "{}-|---------|----------|---------|---------|-------------------",
            "-".repeat(width)
        );
        let mut out = String::new();
        writeln!(out, "{}", divider)?;
        writeln!(
            out,
            "{:<width$} | % Stmts | % Branch | % Funcs | % Lines | Uncovered Line #s ",
            "File",
            width = width
        )?;
        writeln!(out, "{}", divider)?;
        writeln!(out, "{}", row("All files", &map.summary(), "", width))?;
        for (name, file) in names.iter().zip(map.files.values()) {
            let uncovered = line_ranges(&file.uncovered_lines());
            writeln!(out, "{}", row(name, &file.summary(), &uncovered, width))?;
        }
        writeln!(out, "{}", divider)?;

        std::fs::write(dir.join(&self.file), out)?;
        Ok(())
    }
}

/// Overall totals only
#[derive(Debug, Clone)]
pub struct TextSummaryReport {
    file: String,
}

impl TextSummaryReport {
    pub fn new(file: &str) -> Self {
        TextSummaryReport {
            file: file.to_string(),
        }
    }
}

impl Renderer for TextSummaryReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let summary = map.summary();
        let mut out = String::new();
        writeln!(out)?;
        writeln!(out, "{:=^80}", " Coverage summary ")?;
        for (label, totals) in [
            ("Statements", summary.statements),
            ("Branches", summary.branches),
            ("Functions", summary.functions),
            ("Lines", summary.lines),
        ] {
            writeln!(
                out,
                "{:<13}: {}% ( {}/{} )",
                label,
                pct(totals),
                totals.covered,
                totals.total
            )?;
        }
        writeln!(out, "{}", "=".repeat(80))?;

        std::fs::write(dir.join(&self.file), out)?;
        Ok(())
    }
}
