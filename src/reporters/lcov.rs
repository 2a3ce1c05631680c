use crate::reporters::Renderer;
use crate::types::errors::Error;
use crate::types::models::CoverageMap;
use std::fmt::Write as _;
use std::path::Path;

/// `lcov.info` tracefile
#[derive(Debug, Default, Clone, Copy)]
pub struct LcovReport;

impl Renderer for LcovReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let mut out = String::new();
        for (path, file) in &map.files {
            let summary = file.summary();
            writeln!(out, "TN:")?;
            writeln!(out, "SF:{}", path)?;

            for mapping in file.fn_map.values() {
                writeln!(out, "FN:{},{}", mapping.line, mapping.name)?;
            }
            for (id, mapping) in &file.fn_map {
                let hits = file.f.get(id).copied().unwrap_or(0);
                writeln!(out, "FNDA:{},{}", hits, mapping.name)?;
            }
            writeln!(out, "FNF:{}", summary.functions.total)?;
            writeln!(out, "FNH:{}", summary.functions.covered)?;

            for (line, hits) in file.line_hits() {
                writeln!(out, "DA:{},{}", line, hits)?;
            }
            writeln!(out, "LF:{}", summary.lines.total)?;
            writeln!(out, "LH:{}", summary.lines.covered)?;

            for (id, arms) in &file.b {
                let line = file.branch_map.get(id).map(|m| m.line).unwrap_or(0);
                for (arm, hits) in arms.iter().enumerate() {
                    writeln!(out, "BRDA:{},{},{},{}", line, id, arm, hits)?;
                }
            }
            writeln!(out, "BRF:{}", summary.branches.total)?;
            writeln!(out, "BRH:{}", summary.branches.covered)?;
            writeln!(out, "end_of_record")?;
        }
        std::fs::write(dir.join("lcov.info"), out)?;
        Ok(())
    }
}
