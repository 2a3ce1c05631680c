use crate::reporters::Renderer;
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, CoverageSummary, Totals};
use serde_json::{Map, Value, json};
use std::path::Path;

/// The whole coverage map as `coverage-final.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReport;

impl Renderer for JsonReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let json = serde_json::to_string(map)?;
        std::fs::write(dir.join("coverage-final.json"), json)?;
        Ok(())
    }
}

/// Per-file and total percentages as `coverage-summary.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSummaryReport;

fn totals_json(totals: Totals) -> Value {
    json!({
        "total": totals.total,
        "covered": totals.covered,
        "skipped": 0,
        "pct": totals.pct(),
    })
}

fn summary_json(summary: &CoverageSummary) -> Value {
    json!({
        "lines": totals_json(summary.lines),
        "statements": totals_json(summary.statements),
        "functions": totals_json(summary.functions),
        "branches": totals_json(summary.branches),
    })
}

impl Renderer for JsonSummaryReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let mut out = Map::new();
        out.insert("total".to_string(), summary_json(&map.summary()));
        for (path, file) in &map.files {
            out.insert(path.clone(), summary_json(&file.summary()));
        }
        std::fs::write(
            dir.join("coverage-summary.json"),
            serde_json::to_string(&Value::Object(out))?,
        )?;
        Ok(())
    }
}
