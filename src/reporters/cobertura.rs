use crate::reporters::{Renderer, common_root, relative};
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, CoverageSummary, FileCoverage, Totals};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const COBERTURA_FILE: &str = "cobertura-coverage.xml";

/// Cobertura XML, one package per directory and one class per file
#[derive(Debug, Default, Clone, Copy)]
pub struct CoberturaReport;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn rate(totals: Totals) -> String {
    format!("{:.4}", totals.pct() / 100.0)
}

fn write_class(
    out: &mut String,
    path: &str,
    file: &FileCoverage,
    root: &Path,
) -> Result<(), Error> {
    let summary = file.summary();
    let relative_path = relative(path, root);
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative_path.clone());
    let line_hits = file.line_hits();

    writeln!(
        out,
        "        <class name=\"{}\" filename=\"{}\" line-rate=\"{}\" branch-rate=\"{}\">",
        escape(&name),
        escape(&relative_path),
        rate(summary.lines),
        rate(summary.branches)
    )?;
    writeln!(out, "          <methods>")?;
    for (id, mapping) in &file.fn_map {
        let hits = file.f.get(id).copied().unwrap_or(0);
        writeln!(
            out,
            "            <method name=\"{}\" hits=\"{}\" signature=\"()V\">",
            escape(&mapping.name),
            hits
        )?;
        writeln!(out, "              <lines>")?;
        writeln!(
            out,
            "                <line number=\"{}\" hits=\"{}\"/>",
            mapping.line, hits
        )?;
        writeln!(out, "              </lines>")?;
        writeln!(out, "            </method>")?;
    }
    writeln!(out, "          </methods>")?;

    // Branch arms grouped by the line they start on
    let mut branches: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for (id, arms) in &file.b {
        let line = file.branch_map.get(id).map(|m| m.line).unwrap_or(0);
        let entry = branches.entry(line).or_default();
        entry.0 += arms.len();
        entry.1 += arms.iter().filter(|hits| **hits > 0).count();
    }

    writeln!(out, "          <lines>")?;
    for (line, hits) in line_hits {
        match branches.get(&line) {
            Some((total, covered)) => writeln!(
                out,
                "            <line number=\"{}\" hits=\"{}\" branch=\"true\" condition-coverage=\"{}% ({}/{})\"/>",
                line,
                hits,
                covered * 100 / (*total).max(1),
                covered,
                total
            )?,
            None => writeln!(
                out,
                "            <line number=\"{}\" hits=\"{}\" branch=\"false\"/>",
                line, hits
            )?,
        }
    }
    writeln!(out, "          </lines>")?;
    writeln!(out, "        </class>")?;
    Ok(())
}

impl Renderer for CoberturaReport {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error> {
        let root = common_root(map);
        let summary = map.summary();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        // Files grouped by their directory relative to the root
        let mut packages: BTreeMap<String, Vec<(&String, &FileCoverage)>> = BTreeMap::new();
        for (path, file) in &map.files {
            let package = Path::new(&relative(path, &root))
                .parent()
                .map(|p| p.to_string_lossy().replace(['/', '\\'], "."))
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "main".to_string());
            packages.entry(package).or_default().push((path, file));
        }

        let mut out = String::new();
        writeln!(out, "<?xml version=\"1.0\" ?>")?;
        writeln!(
            out,
            "<!DOCTYPE coverage SYSTEM \"http://cobertura.sourceforge.net/xml/coverage-04.dtd\">"
        )?;
        writeln!(
            out,
            "<coverage lines-valid=\"{}\" lines-covered=\"{}\" line-rate=\"{}\" branches-valid=\"{}\" branches-covered=\"{}\" branch-rate=\"{}\" timestamp=\"{}\" complexity=\"0\" version=\"0.1\">",
            summary.lines.total,
            summary.lines.covered,
            rate(summary.lines),
            summary.branches.total,
            summary.branches.covered,
            rate(summary.branches),
            timestamp
        )?;
        writeln!(out, "  <sources>")?;
        writeln!(out, "    <source>{}</source>", escape(&root.to_string_lossy()))?;
        writeln!(out, "  </sources>")?;
        writeln!(out, "  <packages>")?;
        for (package, files) in &packages {
            let mut package_summary = CoverageSummary::default();
            for (_, file) in files {
                package_summary.merge(&file.summary());
            }
            writeln!(
                out,
                "    <package name=\"{}\" line-rate=\"{}\" branch-rate=\"{}\">",
                escape(package),
                rate(package_summary.lines),
                rate(package_summary.branches)
            )?;
            writeln!(out, "      <classes>")?;
            for (path, file) in files {
                write_class(&mut out, path, file, &root)?;
            }
            writeln!(out, "      </classes>")?;
            writeln!(out, "    </package>")?;
        }
        writeln!(out, "  </packages>")?;
        writeln!(out, "</coverage>")?;

        std::fs::write(dir.join(COBERTURA_FILE), out)?;
        Ok(())
    }
}
